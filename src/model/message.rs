//! Messages as produced by a message source.
//!
//! A message is immutable once a source hands it out. The engine only ever holds it
//! behind an `Arc` and addresses it through [`MessageKey`].

use super::bookmark::{Bookmark, OrderKey};
use super::identifiers::{MessageKey, SourceId};
use chrono::{DateTime, Utc};
use std::ops::Range;
use std::sync::Arc;

/// Shared handle to an immutable message.
pub type MessageRef = Arc<Message>;

/// Which text of a message is split into display lines.
///
/// The display-text strategy is chosen once per navigation and travels with the
/// buffer, so every line of one buffer generation is rendered the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextMode {
    /// Text as formatted by the source (the usual display).
    #[default]
    Formatted,
    /// Raw text as stored in the log, falling back to the formatted text.
    Raw,
}

/// Multi-line text with a precomputed line table.
///
/// Offsets are byte offsets into [`MessageText::as_str`]. Line spans exclude the line
/// terminator (`\n` or `\r\n`). A single trailing terminator is dropped on
/// construction, so `"a\n"` is one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageText {
    text: String,
    line_starts: Vec<usize>,
}

impl MessageText {
    /// Build the line table for `text`.
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.ends_with('\n') {
            text.pop();
            if text.ends_with('\r') {
                text.pop();
            }
        }

        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );

        Self { text, line_starts }
    }

    /// Full text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of lines. Always >= 1; empty text is one empty line.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte span of a line inside the full text, without its terminator.
    ///
    /// # Panics
    ///
    /// Panics if `index >= line_count()`.
    pub fn line_span(&self, index: usize) -> Range<usize> {
        assert!(
            index < self.line_starts.len(),
            "line {} out of bounds (line_count: {})",
            index,
            self.line_starts.len()
        );

        let start = self.line_starts[index];
        let mut end = match self.line_starts.get(index + 1) {
            Some(next) => next - 1,
            None => self.text.len(),
        };
        if end > start && self.text.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        start..end
    }

    /// Text of a line, without its terminator.
    pub fn line(&self, index: usize) -> &str {
        &self.text[self.line_span(index)]
    }

    /// Iterate over all lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        (0..self.line_count()).map(move |i| self.line(i))
    }
}

/// One log message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    source_id: SourceId,
    position: u64,
    end_position: u64,
    timestamp: DateTime<Utc>,
    text: MessageText,
    raw_text: Option<MessageText>,
}

impl Message {
    /// Create a message occupying `[position, end_position)` in its source.
    ///
    /// # Panics
    ///
    /// Panics if `end_position < position`.
    pub fn new(
        source_id: SourceId,
        position: u64,
        end_position: u64,
        timestamp: DateTime<Utc>,
        text: impl Into<String>,
    ) -> Self {
        assert!(
            end_position >= position,
            "message end {} precedes its position {}",
            end_position,
            position
        );
        Self {
            source_id,
            position,
            end_position,
            timestamp,
            text: MessageText::new(text),
            raw_text: None,
        }
    }

    /// Attach the raw (unformatted) text of the message.
    pub fn with_raw_text(mut self, raw: impl Into<String>) -> Self {
        self.raw_text = Some(MessageText::new(raw));
        self
    }

    /// Owning source.
    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    /// Byte position where the message begins.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Byte position just past the message.
    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    /// Number of bytes the message occupies in its source.
    pub fn byte_len(&self) -> u64 {
        self.end_position - self.position
    }

    /// Message timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Stable identity.
    pub fn key(&self) -> MessageKey {
        MessageKey::new(self.source_id, self.position)
    }

    /// Text selected by `mode`. Raw mode falls back to the formatted text.
    pub fn text(&self, mode: TextMode) -> &MessageText {
        match mode {
            TextMode::Formatted => &self.text,
            TextMode::Raw => self.raw_text.as_ref().unwrap_or(&self.text),
        }
    }

    /// Merge-order key of one of the message's text lines.
    pub fn order_key(&self, line_index: usize) -> OrderKey {
        OrderKey {
            timestamp: self.timestamp,
            position: self.position,
            source_id: self.source_id,
            line_index,
        }
    }

    /// Bookmark addressing one of the message's text lines.
    pub fn bookmark(&self, line_index: usize) -> Bookmark {
        Bookmark::new(self.source_id, self.position, line_index, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    mod message_text {
        use super::*;

        #[test]
        fn single_line_text_has_one_line() {
            let text = MessageText::new("hello");
            assert_eq!(text.line_count(), 1);
            assert_eq!(text.line(0), "hello");
        }

        #[test]
        fn empty_text_is_one_empty_line() {
            let text = MessageText::new("");
            assert_eq!(text.line_count(), 1);
            assert_eq!(text.line(0), "");
        }

        #[test]
        fn splits_on_newlines() {
            let text = MessageText::new("first\nsecond\nthird");
            assert_eq!(text.line_count(), 3);
            assert_eq!(text.lines().collect::<Vec<_>>(), vec!["first", "second", "third"]);
        }

        #[test]
        fn crlf_terminators_are_excluded_from_spans() {
            let text = MessageText::new("a\r\nbb\r\nccc");
            assert_eq!(text.line(0), "a");
            assert_eq!(text.line(1), "bb");
            assert_eq!(text.line(2), "ccc");
            assert_eq!(text.line_span(1), 3..5);
        }

        #[test]
        fn single_trailing_newline_is_dropped() {
            let text = MessageText::new("line\n");
            assert_eq!(text.line_count(), 1);
            assert_eq!(text.as_str(), "line");
        }

        #[test]
        fn blank_lines_are_preserved() {
            let text = MessageText::new("a\n\nb");
            assert_eq!(text.line_count(), 3);
            assert_eq!(text.line(1), "");
        }

        #[test]
        #[should_panic(expected = "out of bounds")]
        fn line_span_panics_past_last_line() {
            MessageText::new("one").line_span(1);
        }
    }

    mod message {
        use super::*;

        #[test]
        fn byte_len_is_end_minus_position() {
            let msg = Message::new(SourceId::new(1), 100, 140, ts(0), "x");
            assert_eq!(msg.byte_len(), 40);
        }

        #[test]
        #[should_panic(expected = "precedes")]
        fn new_rejects_inverted_span() {
            Message::new(SourceId::new(1), 10, 5, ts(0), "x");
        }

        #[test]
        fn raw_mode_falls_back_to_formatted_text() {
            let msg = Message::new(SourceId::new(1), 0, 10, ts(0), "formatted");
            assert_eq!(msg.text(TextMode::Raw).as_str(), "formatted");
        }

        #[test]
        fn raw_mode_uses_raw_text_when_present() {
            let msg = Message::new(SourceId::new(1), 0, 10, ts(0), "formatted")
                .with_raw_text("raw\ntext");
            assert_eq!(msg.text(TextMode::Raw).line_count(), 2);
            assert_eq!(msg.text(TextMode::Formatted).line_count(), 1);
        }

        #[test]
        fn key_combines_source_and_position() {
            let msg = Message::new(SourceId::new(4), 64, 80, ts(0), "x");
            assert_eq!(msg.key(), MessageKey::new(SourceId::new(4), 64));
        }

        #[test]
        fn bookmark_carries_line_and_timestamp() {
            let msg = Message::new(SourceId::new(4), 64, 80, ts(1234), "a\nb");
            let bookmark = msg.bookmark(1);
            assert_eq!(bookmark.source_id, SourceId::new(4));
            assert_eq!(bookmark.position, 64);
            assert_eq!(bookmark.line_index, 1);
            assert_eq!(bookmark.timestamp, ts(1234));
        }
    }
}
