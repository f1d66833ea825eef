//! Line addressing and the total order used throughout the engine.
//!
//! Lines of all sources are ordered by [`OrderKey`]:
//!
//! 1. message timestamp
//! 2. message position
//! 3. source id (stable tie-break between sources)
//! 4. text line index within the message
//!
//! Bookmarks and merged buffer entries share this order, so "first line >= bookmark"
//! means the same thing everywhere.

use super::identifiers::{MessageKey, SourceId};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Sort key of one display line. Field order is the comparison order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey {
    /// Message timestamp.
    pub timestamp: DateTime<Utc>,
    /// Message position inside its source.
    pub position: u64,
    /// Owning source.
    pub source_id: SourceId,
    /// Text line within the message.
    pub line_index: usize,
}

impl OrderKey {
    /// Same key with the line index replaced.
    pub fn with_line(self, line_index: usize) -> Self {
        Self { line_index, ..self }
    }

    /// Identity of the message this key belongs to.
    pub fn message_key(&self) -> MessageKey {
        MessageKey::new(self.source_id, self.position)
    }

    /// Compare only the message part of two keys, ignoring the line index.
    pub fn cmp_message(&self, other: &Self) -> Ordering {
        self.with_line(0).cmp(&other.with_line(0))
    }
}

/// Address of one text line of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bookmark {
    /// Source connection the line belongs to.
    pub source_id: SourceId,
    /// Position of the message in the source.
    pub position: u64,
    /// Text line within the message.
    pub line_index: usize,
    /// Message timestamp, used to locate the line in other sources.
    pub timestamp: DateTime<Utc>,
}

impl Bookmark {
    /// Create a bookmark.
    pub fn new(
        source_id: SourceId,
        position: u64,
        line_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id,
            position,
            line_index,
            timestamp,
        }
    }

    /// Key of the bookmarked line in the merge order.
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            timestamp: self.timestamp,
            position: self.position,
            source_id: self.source_id,
            line_index: self.line_index,
        }
    }

    /// Identity of the bookmarked message.
    pub fn message_key(&self) -> MessageKey {
        MessageKey::new(self.source_id, self.position)
    }

    /// True if both bookmarks address the same line, ignoring the timestamp.
    pub fn same_line(&self, other: &Bookmark) -> bool {
        self.source_id == other.source_id
            && self.position == other.position
            && self.line_index == other.line_index
    }
}

impl PartialOrd for Bookmark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bookmark {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}
