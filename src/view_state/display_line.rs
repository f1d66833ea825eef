//! One visual line of a message.

use crate::model::{Bookmark, MessageRef, OrderKey, TextMode};

/// A single text line of a message, as buffered by a source window.
///
/// `offset_begin`/`offset_end` divide the message's byte span evenly between its
/// lines. They are only used for scroll interpolation, never for addressing.
#[derive(Debug, Clone)]
pub struct DisplayLine {
    message: MessageRef,
    text_mode: TextMode,
    line_index: usize,
    line_count: usize,
    offset_begin: f64,
    offset_end: f64,
}

impl DisplayLine {
    /// Build the display line `line_index` of `message` under `text_mode`.
    ///
    /// # Panics
    ///
    /// Panics if `line_index` is not a line of the message's text in that mode.
    pub fn new(message: MessageRef, text_mode: TextMode, line_index: usize) -> Self {
        let line_count = message.text(text_mode).line_count();
        assert!(
            line_index < line_count,
            "line {} out of bounds for {} (line_count: {})",
            line_index,
            message.key(),
            line_count
        );

        let byte_len = message.byte_len() as f64;
        let per_line = byte_len / line_count as f64;
        Self {
            message,
            text_mode,
            line_index,
            line_count,
            offset_begin: per_line * line_index as f64,
            offset_end: per_line * (line_index + 1) as f64,
        }
    }

    /// All lines of `message` starting at `from_line`.
    pub fn lines_of(
        message: &MessageRef,
        text_mode: TextMode,
        from_line: usize,
    ) -> impl Iterator<Item = DisplayLine> + '_ {
        let count = message.text(text_mode).line_count();
        (from_line..count).map(move |i| DisplayLine::new(message.clone(), text_mode, i))
    }

    /// Lines of `message` before `until_line`.
    pub fn lines_before(
        message: &MessageRef,
        text_mode: TextMode,
        until_line: usize,
    ) -> impl Iterator<Item = DisplayLine> + '_ {
        (0..until_line).map(move |i| DisplayLine::new(message.clone(), text_mode, i))
    }

    /// Message this line belongs to.
    pub fn message(&self) -> &MessageRef {
        &self.message
    }

    /// Index of the line inside the message text.
    pub fn line_index(&self) -> usize {
        self.line_index
    }

    /// Number of lines of the message in this line's text mode.
    pub fn line_count(&self) -> usize {
        self.line_count
    }

    /// Text mode the line was split under.
    pub fn text_mode(&self) -> TextMode {
        self.text_mode
    }

    /// Line text without terminator.
    pub fn text(&self) -> &str {
        self.message.text(self.text_mode).line(self.line_index)
    }

    /// Start of the line's share of the message byte span, relative to the message.
    pub fn offset_begin(&self) -> f64 {
        self.offset_begin
    }

    /// End of the line's share of the message byte span, relative to the message.
    pub fn offset_end(&self) -> f64 {
        self.offset_end
    }

    /// Absolute (fractional) byte position where the line begins.
    pub fn begin_point(&self) -> f64 {
        self.message.position() as f64 + self.offset_begin
    }

    /// Absolute (fractional) byte position where the line ends.
    pub fn end_point(&self) -> f64 {
        self.message.position() as f64 + self.offset_end
    }

    /// True for the first line of the message.
    pub fn is_first_line(&self) -> bool {
        self.line_index == 0
    }

    /// True for the last line of the message.
    pub fn is_last_line(&self) -> bool {
        self.line_index + 1 == self.line_count
    }

    /// Merge-order key.
    pub fn order_key(&self) -> OrderKey {
        self.message.order_key(self.line_index)
    }

    /// Bookmark addressing this line.
    pub fn bookmark(&self) -> Bookmark {
        self.message.bookmark(self.line_index)
    }

    /// True if the bookmark addresses exactly this line.
    pub fn matches(&self, bookmark: &Bookmark) -> bool {
        self.message.source_id() == bookmark.source_id
            && self.message.position() == bookmark.position
            && self.line_index == bookmark.line_index
    }
}
