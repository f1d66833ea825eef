//! Scroll-position accounting for merged lines.
//!
//! A [`ScrollProfile`] assigns every merged line the scroll-position span its source
//! maps it to, and accumulates them into a piecewise-linear function `G(x)`: the total
//! scroll length of all sources above continuous line index `x`. `G(0)` is the scroll
//! length above the first buffered line of every source, so `G` is comparable across
//! buffer generations.
//!
//! The proportional buffer position of a view whose top sits at `x` is
//!
//! ```text
//! BP(x) = G(x) / (L - (G(x + extent) - G(x)))
//! ```
//!
//! where `L` is the combined scroll length of all sources and `extent` the number of
//! lines the view spans. `BP` is non-decreasing in `x`.

use super::merge::MergedLine;
use super::source_window::SourceWindow;
use crate::source::MessageSource;

/// Iterations of the bisection in [`ScrollProfile::solve_top`].
const SOLVE_ITERATIONS: usize = 64;

/// Scroll position of a fractional byte position, interpolated between the two
/// neighbouring integer positions.
pub fn scroll_at(source: &dyn MessageSource, point: f64) -> f64 {
    let floor = point.max(0.0).floor();
    let position = floor as u64;
    let low = source.position_to_scroll_position(position) as f64;
    let fraction = point - floor;
    if fraction <= 0.0 {
        return low;
    }
    let high = source.position_to_scroll_position(position + 1) as f64;
    low + (high - low) * fraction
}

/// Cumulative scroll lengths over a merged run of lines.
#[derive(Debug, Clone)]
pub struct ScrollProfile {
    prefix: Vec<f64>,
    total: f64,
}

impl ScrollProfile {
    /// Build the profile of `merged`, which must be the merge of `windows`.
    pub fn new(windows: &[SourceWindow], merged: &[MergedLine<'_>]) -> Self {
        let mut above = 0.0;
        let mut total = 0.0;
        for window in windows {
            let source = window.source().as_ref();
            let scroll = source.scroll_positions_range();
            let first_point = window
                .needed_lines()
                .first()
                .map_or(window.begin_position() as f64, |l| l.begin_point());
            above += (scroll_at(source, first_point) - scroll.begin as f64).max(0.0);
            total += scroll.len() as f64;
        }

        let mut prefix = Vec::with_capacity(merged.len() + 1);
        prefix.push(above);
        let mut acc = above;
        for m in merged {
            let source = windows[m.window_index].source().as_ref();
            let len = scroll_at(source, m.line.end_point()) - scroll_at(source, m.line.begin_point());
            acc += len.max(0.0);
            prefix.push(acc);
        }

        Self { prefix, total }
    }

    /// Number of lines covered.
    pub fn len(&self) -> usize {
        self.prefix.len() - 1
    }

    /// Check if the profile covers no lines.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combined scroll length of all sources.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// `G(x)`: scroll length above continuous line index `x`, clamped to the profile.
    pub fn at(&self, x: f64) -> f64 {
        let n = self.len();
        let x = x.clamp(0.0, n as f64);
        let i = x.floor() as usize;
        if i >= n {
            return self.prefix[n];
        }
        let fraction = x - i as f64;
        self.prefix[i] + (self.prefix[i + 1] - self.prefix[i]) * fraction
    }

    /// Proportional position in `[0, 1]` of a view whose top is at `top` and which
    /// spans `extent` lines.
    pub fn position_fraction(&self, top: f64, extent: f64) -> f64 {
        if self.is_empty() || self.total <= 0.0 {
            return 0.0;
        }
        let above = self.at(top);
        let visible = self.at(top + extent) - above;
        let scrollable = self.total - visible;
        if scrollable <= f64::EPSILON {
            return if above > 0.0 { 1.0 } else { 0.0 };
        }
        (above / scrollable).clamp(0.0, 1.0)
    }

    /// Find the top `x` in `[lo, hi]` whose [`position_fraction`](Self::position_fraction)
    /// equals `fraction`.
    ///
    /// Solves `(1 - f) * G(x) + f * G(x + extent) = f * L` by bisection; the left-hand
    /// side is non-decreasing in `x`.
    pub fn solve_top(&self, fraction: f64, extent: f64, lo: f64, hi: f64) -> f64 {
        let target = fraction * self.total;
        let weighted = |x: f64| (1.0 - fraction) * self.at(x) + fraction * self.at(x + extent);

        if hi <= lo || weighted(lo) >= target {
            return lo;
        }
        if weighted(hi) <= target {
            return hi;
        }

        let (mut lo, mut hi) = (lo, hi);
        for _ in 0..SOLVE_ITERATIONS {
            let mid = (lo + hi) / 2.0;
            if weighted(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        hi
    }
}
