//! In-memory message source.
//!
//! Messages are appended with [`MemorySource::push`] and laid out back to back: each
//! message occupies its text length plus one terminator byte, so positions are the
//! cumulative byte lengths of the messages before it. Scroll positions equal byte
//! positions.
//!
//! The source may grow while a viewer is reading it. Every read yields to the runtime
//! once before touching the message list, so reads are genuine suspension points.

use super::{DateBound, EnumDirection, MessageSource, MessageVisitor, PositionRange, ReadPriority};
use crate::model::{Message, MessageRef, SourceError, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Append-only in-memory message list implementing [`MessageSource`].
#[derive(Debug)]
pub struct MemorySource {
    id: SourceId,
    messages: RwLock<Vec<MessageRef>>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            messages: RwLock::new(Vec::new()),
        }
    }

    /// Create a source pre-filled with `(timestamp, text)` pairs.
    pub fn with_messages<I, S>(id: SourceId, messages: I) -> Self
    where
        I: IntoIterator<Item = (DateTime<Utc>, S)>,
        S: Into<String>,
    {
        let source = Self::new(id);
        for (timestamp, text) in messages {
            source.push(timestamp, text);
        }
        source
    }

    /// Append a message and return it.
    ///
    /// # Panics
    ///
    /// Panics if `timestamp` is older than the last message's timestamp. Timestamp
    /// lookups binary-search the list and rely on it being sorted.
    pub fn push(&self, timestamp: DateTime<Utc>, text: impl Into<String>) -> MessageRef {
        let text = text.into();
        self.append(timestamp, text.len() as u64 + 1, |position, end| {
            Message::new(self.id, position, end, timestamp, text)
        })
    }

    /// Append a message carrying both formatted and raw text.
    ///
    /// The message spans the raw text, which is what a log file would hold.
    pub fn push_with_raw(
        &self,
        timestamp: DateTime<Utc>,
        text: impl Into<String>,
        raw: impl Into<String>,
    ) -> MessageRef {
        let raw = raw.into();
        self.append(timestamp, raw.len() as u64 + 1, |position, end| {
            Message::new(self.id, position, end, timestamp, text).with_raw_text(raw)
        })
    }

    fn append(
        &self,
        timestamp: DateTime<Utc>,
        byte_len: u64,
        build: impl FnOnce(u64, u64) -> Message,
    ) -> MessageRef {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        let position = messages.last().map_or(0, |m| m.end_position());
        if let Some(last) = messages.last() {
            assert!(
                last.timestamp() <= timestamp,
                "message timestamps must not decrease ({} after {})",
                timestamp,
                last.timestamp()
            );
        }

        let message = Arc::new(build(position, position + byte_len));
        messages.push(Arc::clone(&message));
        message
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Check if the source holds no messages.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Message at `index` in position order.
    pub fn message(&self, index: usize) -> Option<MessageRef> {
        self.read().get(index).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<MessageRef>> {
        self.messages.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn enum_messages(
        &self,
        from: u64,
        direction: EnumDirection,
        _priority: ReadPriority,
        visit: &mut MessageVisitor<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        tokio::task::yield_now().await;

        let messages = self.read();
        let start = messages.partition_point(|m| m.position() < from);
        let mut visited = 0usize;

        match direction {
            EnumDirection::Forward => {
                for message in &messages[start..] {
                    if cancel.is_cancelled() {
                        break;
                    }
                    visited += 1;
                    if !visit(Arc::clone(message)) {
                        break;
                    }
                }
            }
            EnumDirection::Backward => {
                for message in messages[..start].iter().rev() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    visited += 1;
                    if !visit(Arc::clone(message)) {
                        break;
                    }
                }
            }
        }

        trace!(source = %self.id, from, ?direction, visited, "Enumerated messages");
        Ok(())
    }

    async fn date_bound_position(
        &self,
        timestamp: DateTime<Utc>,
        bound: DateBound,
        _priority: ReadPriority,
        _cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        tokio::task::yield_now().await;

        let messages = self.read();
        let index = match bound {
            DateBound::Lower => messages.partition_point(|m| m.timestamp() < timestamp),
            DateBound::Upper => messages.partition_point(|m| m.timestamp() <= timestamp),
        };
        Ok(messages
            .get(index)
            .map_or_else(|| messages.last().map_or(0, |m| m.end_position()), |m| m.position()))
    }

    fn positions_range(&self) -> PositionRange {
        let end = self.read().last().map_or(0, |m| m.end_position());
        PositionRange::new(0, end)
    }

    fn scroll_positions_range(&self) -> PositionRange {
        self.positions_range()
    }

    fn position_to_scroll_position(&self, position: u64) -> u64 {
        position
    }

    fn scroll_position_to_position(&self, scroll_position: u64) -> u64 {
        scroll_position
    }

    fn has_consecutive_messages(&self) -> bool {
        true
    }
}
