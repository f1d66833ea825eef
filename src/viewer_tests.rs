//! Tests for the log viewer facade.

use super::*;
use crate::highlight::SearchHighlighter;
use crate::model::{SourceError, SourceId};
use crate::source::{
    DateBound, EnumDirection, MemorySource, MessageSource, MessageVisitor, PositionRange,
    ReadPriority,
};
use crate::view_state::InitialBufferPosition;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

// ===== Fixtures =====

fn ts(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
}

fn numbered(id: u64, count: i64) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_messages(
        SourceId::new(id),
        (0..count).map(|i| (ts(i * 10), format!("msg {:04}", i))),
    ))
}

fn texts(id: u64, lines: &[&str]) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_messages(
        SourceId::new(id),
        lines
            .iter()
            .enumerate()
            .map(|(i, text)| (ts(i as i64 * 10), text.to_string())),
    ))
}

fn viewer(view_size: f64) -> LogViewer {
    LogViewer::new(ScreenBuffer::new(view_size), 0)
}

fn search(query: &str) -> Option<Arc<dyn MessageHighlighter>> {
    SearchHighlighter::new(query).map(|h| Arc::new(h) as Arc<dyn MessageHighlighter>)
}

fn spans(ranges: &[HighlightRange]) -> Vec<(usize, usize, HighlightAction)> {
    ranges.iter().map(|r| (r.begin, r.end, r.action)).collect()
}

/// A source whose reads never finish until their token is cancelled.
#[derive(Debug)]
struct StallingSource {
    inner: Arc<MemorySource>,
}

#[async_trait]
impl MessageSource for StallingSource {
    fn id(&self) -> SourceId {
        self.inner.id()
    }

    async fn enum_messages(
        &self,
        _from: u64,
        _direction: EnumDirection,
        _priority: ReadPriority,
        _visit: &mut MessageVisitor<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        cancel.cancelled().await;
        Ok(())
    }

    async fn date_bound_position(
        &self,
        timestamp: DateTime<Utc>,
        bound: DateBound,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<u64, SourceError> {
        self.inner
            .date_bound_position(timestamp, bound, priority, cancel)
            .await
    }

    fn positions_range(&self) -> PositionRange {
        self.inner.positions_range()
    }

    fn scroll_positions_range(&self) -> PositionRange {
        self.inner.scroll_positions_range()
    }

    fn position_to_scroll_position(&self, position: u64) -> u64 {
        self.inner.position_to_scroll_position(position)
    }

    fn scroll_position_to_position(&self, scroll_position: u64) -> u64 {
        self.inner.scroll_position_to_position(scroll_position)
    }

    fn has_consecutive_messages(&self) -> bool {
        true
    }
}

// ===== Construction =====

#[test]
fn from_config_applies_settings() {
    let config = ResolvedConfig {
        view_size: 4.0,
        initial_position: InitialBufferPosition::StreamsEnd,
        highlight_cache_capacity: 2,
        center_on_bookmark: false,
        ..ResolvedConfig::default()
    };
    let viewer = LogViewer::from_config(&config);
    assert!(!viewer.center_on_bookmark);
    viewer.with_buffer(|b| {
        assert_eq!(b.capacity(), 5);
        assert_eq!(b.initial_position(), InitialBufferPosition::StreamsEnd);
    });
    assert!(viewer.lock().highlighting.capacity() >= 5);
}

#[tokio::test]
async fn set_sources_commits_first_lines() {
    let viewer = viewer(3.0);
    viewer.set_sources(vec![numbered(1, 10)]).await.unwrap();
    assert_eq!(
        viewer.visible_text(),
        vec!["msg 0000", "msg 0001", "msg 0002", "msg 0003"]
    );
    assert!(!viewer.in_progress());
}

#[tokio::test]
async fn shift_without_sources_is_a_no_op() {
    let viewer = viewer(3.0);
    assert_eq!(viewer.shift_by(5.0).await.unwrap(), 0);
    assert!(viewer.visible_text().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shift_racing_source_removal_never_panics() {
    let viewer = Arc::new(viewer(5.0));
    let source = numbered(1, 50);

    for _ in 0..100 {
        viewer.set_sources(vec![source.clone()]).await.unwrap();

        let remover = tokio::spawn({
            let viewer = Arc::clone(&viewer);
            async move { viewer.set_sources(Vec::new()).await }
        });
        let shifter = tokio::spawn({
            let viewer = Arc::clone(&viewer);
            async move { viewer.shift_by(3.0).await }
        });

        let removed = remover.await.unwrap();
        let shifted = shifter.await.unwrap();
        assert!(removed.is_ok() || removed.unwrap_err().is_cancelled());
        match shifted {
            Ok(lines) => assert!(lines == 0 || lines == 3),
            Err(e) => assert!(e.is_cancelled()),
        }
    }
}

#[tokio::test]
async fn streams_end_and_reload_follow_growth() {
    let source = numbered(1, 20);
    let viewer = viewer(3.0);
    viewer.set_sources(vec![source.clone()]).await.unwrap();
    viewer.move_to_streams_end().await.unwrap();
    assert_eq!(viewer.visible_text().last().unwrap(), "msg 0019");
    assert!(viewer.buffer_position() > 0.9);

    source.push(ts(1_000), "msg 0020");
    viewer.reload().await.unwrap();
    assert_eq!(viewer.visible_text().last().unwrap(), "msg 0020");
}

// ===== Supersession =====

#[tokio::test]
async fn newer_navigation_supersedes_stalled_one() {
    let viewer = viewer(3.0);
    let stalled: SharedSource = Arc::new(StallingSource {
        inner: numbered(1, 10),
    });

    let first = viewer.set_sources(vec![stalled]);
    let second = async {
        tokio::task::yield_now().await;
        viewer.set_sources(vec![numbered(2, 10)]).await
    };
    let (first, second) = tokio::join!(first, second);

    assert!(first.unwrap_err().is_cancelled());
    second.unwrap();
    viewer.with_buffer(|b| {
        assert_eq!(b.windows().len(), 1);
        assert_eq!(b.windows()[0].source_id(), SourceId::new(2));
    });
    assert!(!viewer.in_progress());
}

#[tokio::test]
async fn cancel_navigation_leaves_buffer_untouched() {
    let viewer = viewer(3.0);
    viewer.set_sources(vec![numbered(1, 10)]).await.unwrap();
    let before = viewer.visible_text();
    let generation = viewer.with_buffer(|b| b.generation());

    let stalled: SharedSource = Arc::new(StallingSource {
        inner: numbered(2, 10),
    });
    let pending = viewer.set_sources(vec![numbered(1, 10), stalled]);
    let cancel = async {
        tokio::task::yield_now().await;
        viewer.cancel_navigation();
    };
    let (result, ()) = tokio::join!(pending, cancel);

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(viewer.visible_text(), before);
    assert_eq!(viewer.with_buffer(|b| b.generation()), generation);
}

// ===== Selection =====

#[tokio::test]
async fn selecting_below_buffer_scrolls_line_to_center() {
    let viewer = viewer(10.0);
    viewer.set_sources(vec![numbered(1, 100)]).await.unwrap();

    viewer
        .set_selection(30, SelectionFlags::NONE, 0)
        .await
        .unwrap();
    assert_eq!(viewer.view_lines_range(), Some((5, 5)));
    assert_eq!(viewer.visible_text()[5], "msg 0030");

    viewer
        .set_selection(-10, SelectionFlags::NONE, 0)
        .await
        .unwrap();
    assert_eq!(viewer.view_lines_range(), Some((5, 5)));
    assert_eq!(viewer.visible_text()[5], "msg 0015");
}

#[tokio::test]
async fn selection_on_empty_buffer_is_ignored() {
    let viewer = viewer(10.0);
    viewer.set_selection(3, SelectionFlags::NONE, 0).await.unwrap();
    assert!(viewer.selection().is_none());
}

#[tokio::test]
async fn select_bookmark_brings_line_into_view() {
    let source = numbered(1, 100);
    let viewer = viewer(10.0);
    viewer.set_sources(vec![source.clone()]).await.unwrap();

    let bookmark = source.message(60).unwrap().bookmark(0);
    assert_eq!(viewer.select_bookmark(bookmark).await.unwrap(), Some(5));
    assert_eq!(viewer.visible_text()[5], "msg 0060");
    assert_eq!(viewer.view_lines_range(), Some((5, 5)));

    // Already buffered: selected in place
    let nearby = source.message(62).unwrap().bookmark(0);
    assert_eq!(viewer.select_bookmark(nearby).await.unwrap(), Some(7));
    assert_eq!(viewer.visible_text()[0], "msg 0055");
}

#[tokio::test]
async fn selected_text_spans_lines() {
    let viewer = viewer(5.0);
    viewer
        .set_sources(vec![texts(1, &["alpha beta", "gamma", "delta"])])
        .await
        .unwrap();
    viewer.set_selection(0, SelectionFlags::NONE, 6).await.unwrap();
    viewer
        .set_selection(1, SelectionFlags::PRESERVE_SELECTION_END, 5)
        .await
        .unwrap();
    assert_eq!(viewer.selected_text().unwrap(), "beta\ngamma");

    viewer.clear_selection();
    assert_eq!(viewer.selected_text(), None);
}

// ===== Highlighting =====

#[tokio::test]
async fn search_highlights_are_line_relative() {
    let viewer = viewer(5.0);
    viewer
        .set_sources(vec![texts(
            1,
            &["error one", "ok", "first line\nsecond error"],
        )])
        .await
        .unwrap();
    viewer.set_highlighter(search("error"));

    let lines = viewer.line_highlights();
    assert_eq!(lines.len(), 4);
    assert_eq!(spans(&lines[0]), vec![(0, 5, HighlightAction::SearchResult)]);
    assert!(lines[1].is_empty());
    assert!(lines[2].is_empty());
    assert_eq!(spans(&lines[3]), vec![(7, 12, HighlightAction::SearchResult)]);
}

#[tokio::test]
async fn selection_is_reported_with_highlights() {
    let viewer = viewer(5.0);
    viewer
        .set_sources(vec![texts(1, &["error one", "ok"])])
        .await
        .unwrap();
    viewer.set_highlighter(search("one"));
    viewer.set_selection(0, SelectionFlags::NONE, 0).await.unwrap();
    viewer
        .set_selection(0, SelectionFlags::PRESERVE_SELECTION_END, 3)
        .await
        .unwrap();

    let lines = viewer.line_highlights();
    assert_eq!(
        spans(&lines[0]),
        vec![
            (6, 9, HighlightAction::SearchResult),
            (0, 3, HighlightAction::Selection)
        ]
    );
    assert!(lines[1].is_empty());
}

#[tokio::test]
async fn replacing_highlighter_invalidates_cache() {
    let viewer = viewer(5.0);
    viewer
        .set_sources(vec![texts(1, &["error one"])])
        .await
        .unwrap();
    viewer.set_highlighter(search("error"));
    assert_eq!(viewer.line_highlights()[0].len(), 1);

    viewer.set_highlighter(search("one"));
    assert_eq!(
        spans(&viewer.line_highlights()[0]),
        vec![(6, 9, HighlightAction::SearchResult)]
    );

    viewer.set_highlighter(None);
    viewer.invalidate_highlighting();
    assert!(viewer.line_highlights()[0].is_empty());
}
