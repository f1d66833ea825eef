//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use logscope::model::{OrderKey, SourceId, TextMode};
use logscope::source::MemorySource;
use logscope::view_state::ScreenBuffer;
use std::sync::Arc;

/// Timestamp `ms` milliseconds after 2024-01-01T00:00:00Z.
pub fn ts(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
}

/// A source with one message per `(millis, text)` pair.
pub fn source(id: u64, messages: &[(i64, String)]) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_messages(
        SourceId::new(id),
        messages.iter().map(|(ms, text)| (ts(*ms), text.clone())),
    ))
}

/// A source of `count` single-line messages spaced `step` milliseconds apart.
pub fn numbered(id: u64, count: usize, offset: i64, step: i64) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_messages(
        SourceId::new(id),
        (0..count).map(|i| (ts(offset + i as i64 * step), format!("s{} m{}", id, i))),
    ))
}

/// Every line of every source, in merge order.
pub fn merged_keys(sources: &[Arc<MemorySource>]) -> Vec<OrderKey> {
    let mut keys: Vec<OrderKey> = sources
        .iter()
        .flat_map(|source| {
            (0..source.len()).filter_map(move |i| source.message(i))
        })
        .flat_map(|message| {
            let lines = message.text(TextMode::Formatted).line_count();
            (0..lines).map(move |line| message.order_key(line))
        })
        .collect();
    keys.sort();
    keys
}

/// Order keys of the buffered lines, top first.
pub fn buffer_keys(buffer: &ScreenBuffer) -> Vec<OrderKey> {
    buffer.entries().iter().map(|e| e.order_key()).collect()
}

/// Index of the buffer's lines inside `all`, asserting they form one contiguous run.
pub fn contiguous_offset(buffer: &ScreenBuffer, all: &[OrderKey]) -> Option<usize> {
    let keys = buffer_keys(buffer);
    let first = keys.first()?;
    let start = all.iter().position(|k| k == first)?;
    let end = start + keys.len();
    assert!(end <= all.len(), "buffer runs past the merged sequence");
    assert_eq!(&all[start..end], keys.as_slice(), "buffer is not a contiguous run");
    Some(start)
}
