//! Message sources.
//!
//! This module defines the contract the engine consumes:
//! - [`MessageSource`] - ordered, randomly seekable, possibly growing message store
//! - [`MemorySource`] - in-memory implementation used by tests, benches and embedders
//!
//! # Positions
//!
//! Every message occupies a half-open byte range `[position, end_position)`. Sources
//! also expose a *scroll position* coordinate: a monotonic mapping of byte positions
//! used only for proportional scrollbar placement. Sparse or filtered sources may map
//! many bytes to one scroll unit.

use crate::model::{MessageRef, SourceError, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod memory;

pub use memory::MemorySource;

/// Half-open range of positions `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionRange {
    /// First position of the range.
    pub begin: u64,
    /// Position just past the range.
    pub end: u64,
}

impl PositionRange {
    /// Create a range.
    ///
    /// # Panics
    /// In debug builds, panics if `begin > end`.
    pub fn new(begin: u64, end: u64) -> Self {
        debug_assert!(begin <= end, "range begin {} > end {}", begin, end);
        Self { begin, end }
    }

    /// Length of the range.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }

    /// Check if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if `position` lies inside the range (end inclusive).
    pub fn contains(&self, position: u64) -> bool {
        position >= self.begin && position <= self.end
    }
}

/// Direction of message enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumDirection {
    /// Messages with `position >= from`, ascending.
    Forward,
    /// Messages with `position < from`, descending.
    Backward,
}

/// Which timestamp bound [`MessageSource::date_bound_position`] searches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBound {
    /// First message with `timestamp >= t`.
    Lower,
    /// First message with `timestamp > t`.
    Upper,
}

/// Scheduling hint passed through to sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPriority {
    /// The user is waiting for this read (jumps, reloads).
    UserAction,
    /// Smooth scrolling; may be served behind user actions.
    Scrolling,
}

/// Callback invoked once per message. Return `false` to stop the enumeration.
pub type MessageVisitor<'a> = dyn FnMut(MessageRef) -> bool + Send + 'a;

/// Ordered, randomly seekable store of messages.
///
/// Implementations must be safe to read from several tasks at once: the engine fans
/// out one read per source and joins them.
///
/// # Cancellation
///
/// Implementations should poll `cancel` between messages and stop early once it fires.
/// Stopping early is not an error; the engine checks the token itself after every read.
#[async_trait]
pub trait MessageSource: Send + Sync + std::fmt::Debug {
    /// Stable identity of this source.
    fn id(&self) -> SourceId;

    /// Visit messages starting at `from` in `direction` until `visit` returns `false`,
    /// the source is exhausted, or `cancel` fires.
    async fn enum_messages(
        &self,
        from: u64,
        direction: EnumDirection,
        priority: ReadPriority,
        visit: &mut MessageVisitor<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError>;

    /// Position of the first message satisfying `bound` relative to `timestamp`, or
    /// `positions_range().end` if there is none.
    async fn date_bound_position(
        &self,
        timestamp: DateTime<Utc>,
        bound: DateBound,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<u64, SourceError>;

    /// Byte-position domain of the source. Grows as the source grows.
    fn positions_range(&self) -> PositionRange;

    /// Scroll-position domain of the source.
    fn scroll_positions_range(&self) -> PositionRange;

    /// Map a byte position to a scroll position. Must be monotonic.
    fn position_to_scroll_position(&self, position: u64) -> u64;

    /// Map a scroll position back to a byte position.
    fn scroll_position_to_position(&self, scroll_position: u64) -> u64;

    /// True if consecutive messages leave no position gaps between them.
    fn has_consecutive_messages(&self) -> bool;
}

/// Shared handle to a message source.
pub type SharedSource = Arc<dyn MessageSource>;
