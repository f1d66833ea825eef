//! The screen buffer: exactly enough merged lines to fill the view.
//!
//! A [`ScreenBuffer`] owns one [`SourceWindow`] per source and keeps
//! `capacity = ceil(view_size) + 1` merged lines plus the fraction of the top line that
//! is scrolled out of view.
//!
//! # Atomicity
//!
//! Every operation works on a private copy of the buffer. Reads from all sources are
//! fanned out and joined, the cancellation token is checked after every join, and the
//! copy replaces `self` only when the whole operation succeeded. A cancelled or failed
//! operation leaves the buffer exactly as it was.
//!
//! # Settling
//!
//! After loading, an operation names where the new top line is (by merge index, by
//! [`OrderKey`], or "at the tail") and the buffer settles: lines above the top are marked
//! unneeded in their windows, the visible run is taken from the merge, and each window is
//! finalized once.

use super::buffer_position::ScrollProfile;
use super::display_line::DisplayLine;
use super::merge::{merge_backward, merge_forward, MergedLine};
use super::source_window::SourceWindow;
use crate::model::{Bookmark, EngineError, MessageRef, OrderKey, SourceError, SourceId, TextMode};
use crate::source::{DateBound, ReadPriority, SharedSource};
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Largest scrolled fraction. Keeps the fraction strictly below one so the top line
/// index stays well defined while the last line is fully visible.
pub const MAX_SCROLLED_FRACTION: f64 = 1.0 - 1e-9;

/// Default iterations of the timestamp search behind [`ScreenBuffer::move_to_position`].
pub const DEFAULT_POSITION_SEARCH_ITERATIONS: u32 = 64;

/// Where a buffer without content starts when sources are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialBufferPosition {
    /// Beginning of all streams.
    #[default]
    StreamsBegin,
    /// End of all streams.
    StreamsEnd,
    /// Nowhere: the buffer stays empty until the first navigation.
    Nowhere,
}

impl fmt::Display for InitialBufferPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InitialBufferPosition::StreamsBegin => "streams_begin",
            InitialBufferPosition::StreamsEnd => "streams_end",
            InitialBufferPosition::Nowhere => "nowhere",
        };
        f.write_str(name)
    }
}

impl FromStr for InitialBufferPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streams_begin" | "begin" => Ok(InitialBufferPosition::StreamsBegin),
            "streams_end" | "end" => Ok(InitialBufferPosition::StreamsEnd),
            "nowhere" => Ok(InitialBufferPosition::Nowhere),
            other => Err(format!(
                "unknown initial position '{}' (expected streams_begin, streams_end or nowhere)",
                other
            )),
        }
    }
}

/// How [`ScreenBuffer::move_to_bookmark`] matches the bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkLookupMode {
    /// Only the exact line (source, position, line index) matches.
    ExactMatch,
    /// First line at or after the bookmark in merge order.
    FindNearestBookmark,
    /// First line whose timestamp is at or after the bookmark's timestamp.
    ///
    /// Coarser than [`FindNearestBookmark`](Self::FindNearestBookmark): every source,
    /// including the bookmark's own, is positioned by timestamp alone.
    FindNearestTime,
}

/// One buffered line and its display index.
#[derive(Debug, Clone)]
pub struct ScreenBufferEntry {
    index: usize,
    line: DisplayLine,
}

impl ScreenBufferEntry {
    /// Display index (0 is the top line).
    pub fn index(&self) -> usize {
        self.index
    }

    /// The display line.
    pub fn line(&self) -> &DisplayLine {
        &self.line
    }

    /// Message the line belongs to.
    pub fn message(&self) -> &MessageRef {
        self.line.message()
    }

    /// Source of the line.
    pub fn source_id(&self) -> SourceId {
        self.line.message().source_id()
    }

    /// Text line index inside the message.
    pub fn text_line_index(&self) -> usize {
        self.line.line_index()
    }

    /// Merge-order key.
    pub fn order_key(&self) -> OrderKey {
        self.line.order_key()
    }

    /// Bookmark addressing the line.
    pub fn bookmark(&self) -> Bookmark {
        self.line.bookmark()
    }

    /// Line text.
    pub fn text(&self) -> &str {
        self.line.text()
    }
}

/// Where the top line lands when a working copy settles.
#[derive(Debug, Clone, Copy)]
enum Anchor {
    /// Continuous merge index.
    Index(f64),
    /// Offset from the first merged line at or after the key.
    Key(OrderKey, f64),
    /// As far down as the loaded lines allow.
    Tail,
}

/// Where [`ScreenBuffer::move_to_position`] loaded the sources around.
#[derive(Debug, Clone, Copy)]
enum Pivot {
    Position(u64),
    Time(DateTime<Utc>),
}

/// Number of lines a view of `view_size` lines keeps buffered.
pub fn capacity_for(view_size: f64) -> usize {
    view_size.ceil() as usize + 1
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        Err(EngineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Merged view over a set of sources. See the module docs.
#[derive(Debug, Clone)]
pub struct ScreenBuffer {
    view_size: f64,
    capacity: usize,
    initial_position: InitialBufferPosition,
    position_search_iterations: u32,
    text_mode: TextMode,
    windows: Vec<SourceWindow>,
    entries: Vec<ScreenBufferEntry>,
    scrolled_fraction: f64,
    at_streams_end: bool,
    generation: u64,
}

impl ScreenBuffer {
    /// Create an empty buffer for a view of `view_size` lines.
    ///
    /// # Panics
    ///
    /// Panics unless `view_size` is positive and finite.
    pub fn new(view_size: f64) -> Self {
        assert_view_size(view_size);
        Self {
            view_size,
            capacity: capacity_for(view_size),
            initial_position: InitialBufferPosition::default(),
            position_search_iterations: DEFAULT_POSITION_SEARCH_ITERATIONS,
            text_mode: TextMode::default(),
            windows: Vec::new(),
            entries: Vec::new(),
            scrolled_fraction: 0.0,
            at_streams_end: false,
            generation: 0,
        }
    }

    /// Set where the buffer starts when sources are first set.
    pub fn with_initial_position(mut self, initial_position: InitialBufferPosition) -> Self {
        self.initial_position = initial_position;
        self
    }

    /// Set the iteration bound of the timestamp search used by `move_to_position`.
    pub fn with_position_search_iterations(mut self, iterations: u32) -> Self {
        self.position_search_iterations = iterations.max(1);
        self
    }

    /// Set the text mode used before any source is loaded.
    pub fn with_text_mode(mut self, text_mode: TextMode) -> Self {
        self.text_mode = text_mode;
        self
    }

    // ===== Accessors =====

    /// Number of lines the view shows (may be fractional).
    pub fn view_size(&self) -> f64 {
        self.view_size
    }

    /// Number of lines the buffer holds when enough are available.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Initial position used by `set_sources` on an empty buffer.
    pub fn initial_position(&self) -> InitialBufferPosition {
        self.initial_position
    }

    /// Text mode the lines are split under.
    pub fn text_mode(&self) -> TextMode {
        self.text_mode
    }

    /// Buffered lines in display order.
    pub fn entries(&self) -> &[ScreenBufferEntry] {
        &self.entries
    }

    /// Fraction of the top line scrolled out of view, in `[0, 1)`.
    pub fn scrolled_fraction(&self) -> f64 {
        self.scrolled_fraction
    }

    /// Sources in source-id order.
    pub fn sources(&self) -> Vec<SharedSource> {
        self.windows.iter().map(|w| w.source().clone()).collect()
    }

    /// True if the buffer has a window for `source_id`.
    pub fn contains_source(&self, source_id: SourceId) -> bool {
        self.windows.iter().any(|w| w.source_id() == source_id)
    }

    /// Per-source windows in source-id order.
    pub fn windows(&self) -> &[SourceWindow] {
        &self.windows
    }

    /// Counter bumped by every committed operation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if the last committed operation left the buffer at the end of every source.
    pub fn at_streams_end(&self) -> bool {
        self.at_streams_end
    }

    /// True if the last line of every source is buffered and the view is scrolled as
    /// far down as it goes.
    pub fn at_tail(&self) -> bool {
        // Reading to the end of every source pins the top at max_top; only the
        // fraction tells whether the view sits at the tail.
        let (_, max_fraction) = self.max_top(self.entries.len());
        self.at_streams_end && self.scrolled_fraction >= max_fraction
    }

    /// Check if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Proportional position of the view in `[0, 1]`, for scrollbar placement.
    ///
    /// Zero for an empty buffer.
    pub fn buffer_position(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let merged: Vec<MergedLine<'_>> = merge_forward(&self.windows).collect();
        ScrollProfile::new(&self.windows, &merged)
            .position_fraction(self.scrolled_fraction, self.view_extent())
    }

    fn view_extent(&self) -> f64 {
        (self.capacity - 1) as f64
    }

    // ===== Operations =====

    /// Replace the set of sources.
    ///
    /// Surviving sources keep their lines. New sources are loaded at the current top
    /// line's timestamp, or at the initial position when the buffer has no content.
    ///
    /// # Panics
    ///
    /// Panics if two sources share an id.
    pub async fn set_sources(
        &mut self,
        sources: Vec<SharedSource>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut ids: Vec<SourceId> = sources.iter().map(|s| s.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), sources.len(), "duplicate source ids in set_sources");

        let mut work = self.clone();
        let mut old: HashMap<SourceId, SourceWindow> =
            work.windows.drain(..).map(|w| (w.source_id(), w)).collect();
        let removed = old.keys().filter(|id| ids.binary_search(id).is_err()).count();

        let mut slots: Vec<(SourceWindow, bool)> = sources
            .into_iter()
            .map(|source| match old.remove(&source.id()) {
                Some(window) => (window, false),
                None => (SourceWindow::new(source, work.text_mode), true),
            })
            .collect();
        slots.sort_by_key(|(w, _)| w.source_id());
        let (windows, fresh): (Vec<_>, Vec<_>) = slots.into_iter().unzip();
        work.windows = windows;

        let cap = work.capacity;
        let priority = ReadPriority::UserAction;
        match self.entries.first().map(|e| e.order_key()) {
            Some(pivot) => {
                try_join_all(work.windows.iter_mut().zip(fresh.iter().copied()).map(
                    |(window, is_new)| async move {
                        if is_new {
                            let position = window
                                .source()
                                .date_bound_position(pivot.timestamp, DateBound::Lower, priority, cancel)
                                .await?;
                            window.load_around(position, 0, cap, priority, cancel).await
                        } else {
                            let missing = cap.saturating_sub(window.len());
                            window.load_after(missing, priority, cancel).await
                        }
                    },
                ))
                .await?;
                ensure_live(cancel)?;
                work.fill_above(pivot, priority, cancel).await?;
                ensure_live(cancel)?;
                work.settle(Anchor::Key(pivot, self.scrolled_fraction));
            }
            None => match work.initial_position {
                InitialBufferPosition::StreamsBegin => {
                    work.load_from_begin(cancel).await?;
                    ensure_live(cancel)?;
                    work.settle(Anchor::Index(0.0));
                }
                InitialBufferPosition::StreamsEnd => {
                    work.load_from_end(cancel).await?;
                    ensure_live(cancel)?;
                    work.settle(Anchor::Tail);
                }
                InitialBufferPosition::Nowhere => {
                    ensure_live(cancel)?;
                    for window in &mut work.windows {
                        let begin = window.source().positions_range().begin;
                        window.reset_at(begin);
                    }
                    work.settle(Anchor::Index(0.0));
                }
            },
        }

        debug!(
            added = fresh.iter().filter(|f| **f).count(),
            removed,
            "Sources replaced"
        );
        self.commit(work, "set_sources");
        Ok(())
    }

    /// Show the beginning of all sources.
    pub async fn move_to_streams_begin(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut work = self.clone();
        work.load_from_begin(cancel).await?;
        ensure_live(cancel)?;
        work.settle(Anchor::Index(0.0));
        self.commit(work, "move_to_streams_begin");
        Ok(())
    }

    /// Show the end of all sources, with the last line fully visible.
    pub async fn move_to_streams_end(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut work = self.clone();
        work.load_from_end(cancel).await?;
        ensure_live(cancel)?;
        work.settle(Anchor::Tail);
        self.commit(work, "move_to_streams_end");
        Ok(())
    }

    /// Scroll by `delta` display lines (negative scrolls up).
    ///
    /// Returns the number of whole lines the top moved, which is smaller than requested
    /// at stream boundaries.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has no sources.
    pub async fn shift_by(
        &mut self,
        delta: f64,
        cancel: &CancellationToken,
    ) -> Result<isize, EngineError> {
        assert!(
            !self.windows.is_empty(),
            "cannot shift a screen buffer without sources"
        );
        if delta == 0.0 || delta.is_nan() {
            return Ok(0);
        }

        let mut work = self.clone();
        let cap = work.capacity;
        let priority = ReadPriority::Scrolling;
        let target = self.scrolled_fraction + delta;

        if target >= 0.0 {
            let needed = (target.floor() as usize).saturating_add(cap);
            try_join_all(work.windows.iter_mut().map(|window| {
                let missing = needed.saturating_sub(window.len());
                window.load_after(missing, priority, cancel)
            }))
            .await?;
        } else {
            let needed = (-target).ceil() as usize;
            try_join_all(
                work.windows
                    .iter_mut()
                    .map(|window| window.load_before(needed, priority, cancel)),
            )
            .await?;
        }
        ensure_live(cancel)?;

        let anchor = match self.entries.first() {
            Some(top) => Anchor::Key(top.order_key(), target),
            None => Anchor::Index(target.max(0.0)),
        };
        let settled = work.settle(anchor);
        let shifted = settled.top as isize - settled.base as isize;
        self.commit(work, "shift_by");
        Ok(shifted)
    }

    /// Move to a bookmarked line.
    ///
    /// Returns the display index of the matched line. `None` means an exact bookmark
    /// was not found (the buffer is unchanged) or a nearest search found nothing at or
    /// after the bookmark (the buffer moved to the end of all sources). With `center`,
    /// the match is placed in the middle of the view when the sources allow it.
    pub async fn move_to_bookmark(
        &mut self,
        bookmark: &Bookmark,
        mode: BookmarkLookupMode,
        center: bool,
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, EngineError> {
        let mut work = self.clone();
        let cap = work.capacity;
        let priority = ReadPriority::UserAction;

        try_join_all(work.windows.iter_mut().map(|window| async move {
            let position = if mode != BookmarkLookupMode::FindNearestTime
                && window.source_id() == bookmark.source_id
            {
                bookmark.position
            } else {
                window
                    .source()
                    .date_bound_position(bookmark.timestamp, DateBound::Lower, priority, cancel)
                    .await?
            };
            window.load_around(position, cap, cap, priority, cancel).await
        }))
        .await?;
        ensure_live(cancel)?;

        let found = {
            let merged: Vec<MergedLine<'_>> = merge_forward(&work.windows).collect();
            let index = match mode {
                BookmarkLookupMode::ExactMatch => {
                    merged.iter().position(|m| m.line.matches(bookmark))
                }
                BookmarkLookupMode::FindNearestBookmark => {
                    let target = bookmark.order_key();
                    let i = merged.partition_point(|m| m.line.order_key() < target);
                    (i < merged.len()).then_some(i)
                }
                BookmarkLookupMode::FindNearestTime => {
                    let i = merged
                        .partition_point(|m| m.line.message().timestamp() < bookmark.timestamp);
                    (i < merged.len()).then_some(i)
                }
            };
            index.map(|i| merged[i].line.order_key())
        };

        let Some(key) = found else {
            if mode == BookmarkLookupMode::ExactMatch {
                debug!(bookmark = %bookmark.message_key(), "Bookmark not found");
                return Ok(None);
            }
            work.load_from_end(cancel).await?;
            ensure_live(cancel)?;
            work.settle(Anchor::Tail);
            self.commit(work, "move_to_bookmark");
            return Ok(None);
        };

        let offset = if center {
            -(work.view_size / 2.0).floor()
        } else {
            0.0
        };
        work.settle(Anchor::Key(key, offset));
        let index = work.entries.iter().position(|e| e.order_key() == key);
        self.commit(work, "move_to_bookmark");
        Ok(index)
    }

    /// Move to a proportional position in `[0, 1]` of the combined scroll range.
    ///
    /// With a single well-behaved source the fraction maps straight through the source's
    /// scroll mapping. Otherwise the timestamp whose combined scroll position matches the
    /// fraction is found by binary search and every source is loaded around it.
    pub async fn move_to_position(
        &mut self,
        fraction: f64,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        let mut work = self.clone();
        let cap = work.capacity;
        let priority = ReadPriority::UserAction;

        let total_scroll: u64 = work
            .windows
            .iter()
            .map(|w| w.source().scroll_positions_range().len())
            .sum();
        if total_scroll == 0 {
            work.load_from_begin(cancel).await?;
            ensure_live(cancel)?;
            work.settle(Anchor::Index(0.0));
            self.commit(work, "move_to_position");
            return Ok(());
        }

        let pivot = match work.fast_path_position(fraction) {
            Some(position) => {
                work.windows[0]
                    .load_around(position, cap, cap, priority, cancel)
                    .await?;
                Pivot::Position(position)
            }
            None => {
                let Some(time) = work
                    .find_time_for_fraction(fraction, total_scroll as f64, cancel)
                    .await?
                else {
                    work.load_from_begin(cancel).await?;
                    ensure_live(cancel)?;
                    work.settle(Anchor::Index(0.0));
                    self.commit(work, "move_to_position");
                    return Ok(());
                };
                try_join_all(work.windows.iter_mut().map(|window| async move {
                    let position = window
                        .source()
                        .date_bound_position(time, DateBound::Lower, priority, cancel)
                        .await?;
                    window.load_around(position, cap, cap, priority, cancel).await
                }))
                .await?;
                Pivot::Time(time)
            }
        };
        ensure_live(cancel)?;

        let top = {
            let merged: Vec<MergedLine<'_>> = merge_forward(&work.windows).collect();
            let base = match pivot {
                Pivot::Position(position) => {
                    merged.partition_point(|m| m.line.message().position() < position)
                }
                Pivot::Time(time) => merged.partition_point(|m| m.line.message().timestamp() < time),
            };
            let profile = ScrollProfile::new(&work.windows, &merged);
            profile.solve_top(
                fraction,
                work.view_extent(),
                base.saturating_sub(cap) as f64,
                base as f64,
            )
        };
        work.settle(Anchor::Index(top));
        self.commit(work, "move_to_position");
        Ok(())
    }

    /// Re-read every window from its begin position, e.g. after sources changed
    /// underneath. A buffer scrolled all the way to the tail stays at the tail; any
    /// other buffer keeps its top line and scrolled fraction.
    pub async fn reload(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut work = self.clone();
        if self.at_tail() {
            work.load_from_end(cancel).await?;
            ensure_live(cancel)?;
            work.settle(Anchor::Tail);
        } else {
            work.reread_from_begin(cancel).await?;
            ensure_live(cancel)?;
            if let Some(top) = self.entries.first() {
                work.fill_above(top.order_key(), ReadPriority::UserAction, cancel)
                    .await?;
                ensure_live(cancel)?;
            }
            work.settle_at_top_of(self);
        }
        self.commit(work, "reload");
        Ok(())
    }

    /// Change the view size, keeping the top line and scrolled fraction.
    ///
    /// # Panics
    ///
    /// Panics unless `view_size` is positive and finite.
    pub async fn set_view_size(
        &mut self,
        view_size: f64,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        assert_view_size(view_size);
        let mut work = self.clone();
        work.view_size = view_size;
        work.capacity = capacity_for(view_size);
        let cap = work.capacity;
        let priority = ReadPriority::UserAction;

        try_join_all(work.windows.iter_mut().map(|window| {
            let missing = cap.saturating_sub(window.len());
            window.load_after(missing, priority, cancel)
        }))
        .await?;
        ensure_live(cancel)?;
        if let Some(top) = self.entries.first() {
            work.fill_above(top.order_key(), priority, cancel).await?;
            ensure_live(cancel)?;
        }
        work.settle_at_top_of(self);
        self.commit(work, "set_view_size");
        Ok(())
    }

    /// Switch between formatted and raw text, keeping the top message in place.
    pub async fn set_text_mode(
        &mut self,
        text_mode: TextMode,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if text_mode == self.text_mode {
            return Ok(());
        }
        let mut work = self.clone();
        work.text_mode = text_mode;
        for window in &mut work.windows {
            window.set_text_mode(text_mode);
        }
        work.reread_from_begin(cancel).await?;
        ensure_live(cancel)?;

        match self.entries.first() {
            Some(top) => {
                let message = top.message();
                let last_line = message.text(text_mode).line_count() - 1;
                let pivot = message.order_key(top.text_line_index().min(last_line));
                work.fill_above(pivot, ReadPriority::UserAction, cancel).await?;
                ensure_live(cancel)?;
                work.settle(Anchor::Key(pivot, self.scrolled_fraction));
            }
            None => {
                work.settle(Anchor::Index(0.0));
            }
        }
        self.commit(work, "set_text_mode");
        Ok(())
    }

    // ===== Loading helpers =====

    async fn load_from_begin(&mut self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let cap = self.capacity;
        try_join_all(self.windows.iter_mut().map(|window| {
            let begin = window.source().positions_range().begin;
            window.load_around(begin, 0, cap, ReadPriority::UserAction, cancel)
        }))
        .await?;
        Ok(())
    }

    async fn load_from_end(&mut self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let cap = self.capacity;
        try_join_all(self.windows.iter_mut().map(|window| {
            let end = window.source().positions_range().end;
            window.load_around(end, cap, 0, ReadPriority::UserAction, cancel)
        }))
        .await?;
        Ok(())
    }

    async fn reread_from_begin(&mut self, cancel: &CancellationToken) -> Result<(), SourceError> {
        let cap = self.capacity;
        try_join_all(self.windows.iter_mut().map(|window| {
            let begin = window.begin_position();
            window.load_around(begin, 0, cap, ReadPriority::UserAction, cancel)
        }))
        .await?;
        Ok(())
    }

    /// Load lines above `pivot` until at least `capacity` lines are available from
    /// the line above the pivot downwards.
    async fn fill_above(
        &mut self,
        pivot: OrderKey,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        let below = merge_forward(&self.windows)
            .filter(|m| m.line.order_key() >= pivot)
            .count();
        if below >= self.capacity {
            return Ok(());
        }
        let needed = self.capacity - below;
        try_join_all(
            self.windows
                .iter_mut()
                .map(|window| window.load_before(needed, priority, cancel)),
        )
        .await?;
        Ok(())
    }

    /// Single-source scroll mapping, when it is safe to use.
    fn fast_path_position(&self, fraction: f64) -> Option<u64> {
        let [window] = self.windows.as_slice() else {
            return None;
        };
        let source = window.source();
        if !source.has_consecutive_messages() {
            warn!(source = %source.id(), "Position fast path rejected: messages are not consecutive");
            return None;
        }

        let scroll = source.scroll_positions_range();
        let positions = source.positions_range();
        let target = (scroll.begin + (fraction * scroll.len() as f64).round() as u64).min(scroll.end);
        let position = source.scroll_position_to_position(target);
        let back = source.position_to_scroll_position(position);
        let low = source.position_to_scroll_position(positions.begin);
        let high = source.position_to_scroll_position(positions.end);

        if !positions.contains(position) || low > high || back < low || back > high {
            warn!(
                source = %source.id(),
                target,
                position,
                back,
                "Position fast path rejected: scroll mapping is not monotonic"
            );
            return None;
        }
        Some(position)
    }

    /// Timestamp whose combined scroll position across all sources first reaches
    /// `fraction * total_scroll`. `None` if no source holds a message.
    async fn find_time_for_fraction(
        &self,
        fraction: f64,
        total_scroll: f64,
        cancel: &CancellationToken,
    ) -> Result<Option<DateTime<Utc>>, EngineError> {
        let priority = ReadPriority::UserAction;
        let firsts = try_join_all(self.windows.iter().map(|w| {
            w.peek_forward(w.source().positions_range().begin, priority, cancel)
        }))
        .await?;
        let lasts = try_join_all(self.windows.iter().map(|w| {
            w.peek_backward(w.source().positions_range().end, priority, cancel)
        }))
        .await?;
        ensure_live(cancel)?;

        let earliest = firsts.iter().flatten().map(|m| m.timestamp()).min();
        let latest = lasts.iter().flatten().map(|m| m.timestamp()).max();
        let (Some(mut lo), Some(latest)) = (earliest, latest) else {
            return Ok(None);
        };

        let target = fraction * total_scroll;
        if self.scroll_before(lo, cancel).await? >= target {
            return Ok(Some(lo));
        }
        ensure_live(cancel)?;

        let resolution = TimeDelta::nanoseconds(1);
        let mut hi = latest + resolution;
        for _ in 0..self.position_search_iterations {
            if hi - lo <= resolution {
                break;
            }
            let mid = lo + (hi - lo) / 2;
            let scroll = self.scroll_before(mid, cancel).await?;
            ensure_live(cancel)?;
            if scroll >= target {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(Some(hi))
    }

    /// Combined scroll length of all messages older than `time`.
    async fn scroll_before(
        &self,
        time: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<f64, SourceError> {
        let positions = try_join_all(self.windows.iter().map(|w| {
            w.source()
                .date_bound_position(time, DateBound::Lower, ReadPriority::UserAction, cancel)
        }))
        .await?;
        Ok(self
            .windows
            .iter()
            .zip(positions)
            .map(|(w, position)| {
                let source = w.source();
                let begin = source.scroll_positions_range().begin;
                source.position_to_scroll_position(position).saturating_sub(begin) as f64
            })
            .sum())
    }

    // ===== Settling =====

    fn settle_at_top_of(&mut self, previous: &ScreenBuffer) {
        let anchor = match previous.entries.first() {
            Some(top) => Anchor::Key(top.order_key(), previous.scrolled_fraction),
            None => Anchor::Index(0.0),
        };
        self.settle(anchor);
    }

    /// Highest top the loaded lines allow, as a line index and scrolled fraction.
    fn max_top(&self, total: usize) -> (usize, f64) {
        if total >= self.capacity {
            (total - self.capacity, MAX_SCROLLED_FRACTION)
        } else {
            (0, (total as f64 - self.view_size).clamp(0.0, MAX_SCROLLED_FRACTION))
        }
    }

    /// Split `position` into a top line and fraction, clamped to `[0, max_top(total)]`.
    fn clamp_top(&self, position: f64, total: usize) -> (usize, f64) {
        let (max_line, max_fraction) = self.max_top(total);
        if position.is_nan() || position <= 0.0 {
            return (0, 0.0);
        }
        if position >= max_line as f64 + max_fraction {
            return (max_line, max_fraction);
        }
        let top = position.floor();
        (top as usize, (position - top).clamp(0.0, MAX_SCROLLED_FRACTION))
    }

    /// Trim the windows to the run starting at `anchor` and rebuild the entries.
    fn settle(&mut self, anchor: Anchor) -> Settled {
        for window in &mut self.windows {
            window.set_unneeded_top(0);
        }
        let cap = self.capacity;
        let n = self.windows.len();
        let mut drop_top = vec![0usize; n];
        let mut keep = vec![0usize; n];

        let (base, top, fraction) = match anchor {
            Anchor::Tail => {
                let total: usize = self.windows.iter().map(|w| w.len()).sum();
                let count = total.min(cap);
                for m in merge_backward(&self.windows).take(count) {
                    keep[m.window_index] += 1;
                }
                for (i, window) in self.windows.iter().enumerate() {
                    drop_top[i] = window.len() - keep[i];
                }
                let (top, fraction) = self.max_top(total);
                (total - count, top, fraction)
            }
            Anchor::Index(_) | Anchor::Key(..) => {
                let merged: Vec<(usize, OrderKey)> = merge_forward(&self.windows)
                    .map(|m| (m.window_index, m.line.order_key()))
                    .collect();
                let (base, offset) = match anchor {
                    Anchor::Key(key, offset) => (merged.partition_point(|(_, k)| *k < key), offset),
                    Anchor::Index(offset) => (0, offset),
                    Anchor::Tail => (0, 0.0),
                };
                let (top, fraction) = self.clamp_top(base as f64 + offset, merged.len());
                for (i, (w, _)) in merged.iter().enumerate() {
                    if i < top {
                        drop_top[*w] += 1;
                    } else if i < top + cap {
                        keep[*w] += 1;
                    }
                }
                (base, top, fraction)
            }
        };

        for (window, drop) in self.windows.iter_mut().zip(&drop_top) {
            window.set_unneeded_top(*drop);
        }
        self.entries = merge_forward(&self.windows)
            .take(cap)
            .enumerate()
            .map(|(index, m)| ScreenBufferEntry {
                index,
                line: m.line.clone(),
            })
            .collect();
        for (window, keep) in self.windows.iter_mut().zip(&keep) {
            window.finalize(*keep);
        }

        self.scrolled_fraction = fraction;
        self.at_streams_end = self.windows.iter().all(|w| w.is_at_stream_end());
        Settled { base, top }
    }

    fn commit(&mut self, mut work: ScreenBuffer, op: &'static str) {
        work.generation = self.generation + 1;
        debug!(
            op,
            entries = work.entries.len(),
            scrolled_fraction = work.scrolled_fraction,
            at_streams_end = work.at_streams_end,
            generation = work.generation,
            "Screen buffer committed"
        );
        *self = work;
    }
}

/// Outcome of settling: merge index of the anchor and of the new top line.
#[derive(Debug, Clone, Copy)]
struct Settled {
    base: usize,
    top: usize,
}

fn assert_view_size(view_size: f64) {
    assert!(
        view_size.is_finite() && view_size > 0.0,
        "view size must be positive and finite, got {}",
        view_size
    );
}

#[cfg(test)]
#[path = "screen_buffer_tests.rs"]
mod tests;
