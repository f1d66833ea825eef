//! Interval lookup over the highlight ranges of one message.

use std::ops::Range;

/// What a highlighted range stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HighlightAction {
    /// A search hit.
    SearchResult,
    /// A match of the filter with the given index in the filter set.
    Filter(usize),
    /// Part of the user's selection.
    Selection,
}

/// A highlighted byte span of a message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HighlightRange {
    /// First byte.
    pub begin: usize,
    /// One past the last byte.
    pub end: usize,
    /// What the range stands for.
    pub action: HighlightAction,
}

impl HighlightRange {
    /// Create a range.
    pub fn new(begin: usize, end: usize, action: HighlightAction) -> Self {
        Self { begin, end, action }
    }

    /// True if the range overlaps `[begin, end)`.
    pub fn overlaps(&self, begin: usize, end: usize) -> bool {
        self.begin < end && self.end > begin
    }

    /// The part of the range inside `interval`, shifted so `interval.start` is zero.
    pub fn relative_to(&self, interval: &Range<usize>) -> HighlightRange {
        let begin = self.begin.clamp(interval.start, interval.end) - interval.start;
        let end = self.end.clamp(interval.start, interval.end) - interval.start;
        HighlightRange::new(begin, end, self.action)
    }
}

/// Ranges sorted by start, with the running maximum of their ends.
///
/// A query for `[begin, end)` binary-searches both arrays, so it only touches the
/// ranges that can overlap.
#[derive(Debug, Clone, Default)]
pub struct RangeIndex {
    ranges: Vec<HighlightRange>,
    max_end: Vec<usize>,
}

impl RangeIndex {
    /// Build the index. Empty ranges are dropped.
    pub fn new(mut ranges: Vec<HighlightRange>) -> Self {
        ranges.retain(|r| r.begin < r.end);
        ranges.sort_by_key(|r| (r.begin, r.end));
        let max_end = ranges
            .iter()
            .scan(0, |max, r| {
                *max = (*max).max(r.end);
                Some(*max)
            })
            .collect();
        Self { ranges, max_end }
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if there are no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Ranges overlapping `[begin, end)`, in start order.
    pub fn query(&self, begin: usize, end: usize) -> impl Iterator<Item = &HighlightRange> + '_ {
        let upto = self.ranges.partition_point(|r| r.begin < end);
        let from = self.max_end[..upto].partition_point(|m| *m <= begin);
        self.ranges[from..upto].iter().filter(move |r| r.end > begin)
    }
}
