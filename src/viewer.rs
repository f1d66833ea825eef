//! The log viewer: one screen buffer driven through the navigation manager.
//!
//! Every navigation clones the committed buffer, runs the operation on the clone and
//! commits it under the state lock only if its cancellation token is still live. A
//! commit re-anchors the selection and keeps the highlighting cache at least as large
//! as the buffer. The lock is never held across an await.

use crate::config::ResolvedConfig;
use crate::highlight::{HighlightAction, HighlightRange, HighlightingCache, MessageHighlighter};
use crate::model::{Bookmark, EngineError, TextMode};
use crate::source::SharedSource;
use crate::state::{NavigationManager, Selection, SelectionFlags, SelectionManager};
use crate::view_state::{BookmarkLookupMode, ScreenBuffer};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
struct ViewerState {
    buffer: ScreenBuffer,
    selection: SelectionManager,
    highlighting: HighlightingCache,
    highlighter: Option<Arc<dyn MessageHighlighter>>,
}

impl ViewerState {
    fn commit(&mut self, buffer: ScreenBuffer) {
        self.buffer = buffer;
        self.selection.on_buffer_changed(&self.buffer);
        self.highlighting.ensure_capacity(self.buffer.capacity());
    }
}

/// Viewport over merged log sources. See the module docs.
#[derive(Debug)]
pub struct LogViewer {
    state: Mutex<ViewerState>,
    navigation: NavigationManager,
    center_on_bookmark: bool,
}

impl LogViewer {
    /// Create a viewer around an empty buffer.
    pub fn new(buffer: ScreenBuffer, highlight_cache_capacity: usize) -> Self {
        let mut highlighting = HighlightingCache::new(highlight_cache_capacity);
        highlighting.ensure_capacity(buffer.capacity());
        Self {
            state: Mutex::new(ViewerState {
                buffer,
                selection: SelectionManager::new(),
                highlighting,
                highlighter: None,
            }),
            navigation: NavigationManager::new(),
            center_on_bookmark: true,
        }
    }

    /// Create a viewer from resolved configuration.
    pub fn from_config(config: &ResolvedConfig) -> Self {
        let mut viewer = Self::new(config.screen_buffer(), config.highlight_cache_capacity);
        viewer.center_on_bookmark = config.center_on_bookmark;
        viewer
    }

    fn lock(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ===== Observation =====

    /// Run `f` against the committed buffer.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&ScreenBuffer) -> R) -> R {
        f(&self.lock().buffer)
    }

    /// Text of every buffered line, top first.
    pub fn visible_text(&self) -> Vec<String> {
        self.with_buffer(|b| b.entries().iter().map(|e| e.text().to_string()).collect())
    }

    /// Proportional position for scrollbar placement.
    pub fn buffer_position(&self) -> f64 {
        self.with_buffer(|b| b.buffer_position())
    }

    /// True while a navigation is running.
    pub fn in_progress(&self) -> bool {
        self.navigation.in_progress()
    }

    /// Watch the navigation-in-progress flag.
    pub fn subscribe_progress(&self) -> watch::Receiver<bool> {
        self.navigation.subscribe()
    }

    /// Cancel the running navigation, if any.
    pub fn cancel_navigation(&self) {
        self.navigation.cancel_current();
    }

    /// Current selection.
    pub fn selection(&self) -> Option<Selection> {
        self.lock().selection.selection().cloned()
    }

    /// Inclusive display-index span of the selection, with `-1` and the buffer
    /// length as off-buffer sentinels.
    pub fn view_lines_range(&self) -> Option<(isize, isize)> {
        let state = self.lock();
        state.selection.view_lines_range(&state.buffer)
    }

    /// Selected text, if the whole selection is buffered.
    pub fn selected_text(&self) -> Option<String> {
        let state = self.lock();
        state.selection.selected_text(&state.buffer)
    }

    // ===== Navigation =====

    async fn run<T, F, Fut>(&self, op: &'static str, operation: F) -> Result<T, EngineError>
    where
        F: FnOnce(ScreenBuffer, CancellationToken) -> Fut,
        Fut: Future<Output = (ScreenBuffer, Result<T, EngineError>)>,
    {
        self.navigation
            .navigate_view(|cancel| async move {
                let working = self.lock().buffer.clone();
                let (working, result) = operation(working, cancel.clone()).await;
                let value = result?;

                let mut state = self.lock();
                if cancel.is_cancelled() {
                    debug!(op, "Discarding result of superseded navigation");
                    return Err(EngineError::Cancelled);
                }
                state.commit(working);
                Ok(value)
            })
            .await
    }

    /// Replace the set of sources.
    pub async fn set_sources(&self, sources: Vec<SharedSource>) -> Result<(), EngineError> {
        self.run("set_sources", |mut buffer, cancel| async move {
            let result = buffer.set_sources(sources, &cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Show the beginning of all sources.
    pub async fn move_to_streams_begin(&self) -> Result<(), EngineError> {
        self.run("move_to_streams_begin", |mut buffer, cancel| async move {
            let result = buffer.move_to_streams_begin(&cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Show the end of all sources.
    pub async fn move_to_streams_end(&self) -> Result<(), EngineError> {
        self.run("move_to_streams_end", |mut buffer, cancel| async move {
            let result = buffer.move_to_streams_end(&cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Scroll by `delta` display lines. Returns the whole lines actually scrolled;
    /// zero while there are no sources.
    pub async fn shift_by(&self, delta: f64) -> Result<isize, EngineError> {
        self.run("shift_by", |mut buffer, cancel| async move {
            if buffer.windows().is_empty() {
                return (buffer, Ok(0));
            }
            let result = buffer.shift_by(delta, &cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Move to a bookmark, centered if the viewer is configured to center.
    pub async fn move_to_bookmark(
        &self,
        bookmark: Bookmark,
        mode: BookmarkLookupMode,
    ) -> Result<Option<usize>, EngineError> {
        let center = self.center_on_bookmark;
        self.run("move_to_bookmark", |mut buffer, cancel| async move {
            let result = buffer.move_to_bookmark(&bookmark, mode, center, &cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Move to a proportional position in `[0, 1]`.
    pub async fn move_to_position(&self, fraction: f64) -> Result<(), EngineError> {
        self.run("move_to_position", |mut buffer, cancel| async move {
            let result = buffer.move_to_position(fraction, &cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Re-read the sources after they changed underneath.
    pub async fn reload(&self) -> Result<(), EngineError> {
        self.run("reload", |mut buffer, cancel| async move {
            let result = buffer.reload(&cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Resize the view.
    pub async fn set_view_size(&self, view_size: f64) -> Result<(), EngineError> {
        self.run("set_view_size", |mut buffer, cancel| async move {
            let result = buffer.set_view_size(view_size, &cancel).await;
            (buffer, result)
        })
        .await
    }

    /// Switch between formatted and raw text.
    pub async fn set_text_mode(&self, text_mode: TextMode) -> Result<(), EngineError> {
        self.run("set_text_mode", |mut buffer, cancel| async move {
            let result = buffer.set_text_mode(text_mode, &cancel).await;
            (buffer, result)
        })
        .await
    }

    // ===== Selection =====

    /// Place the cursor at `display_index`.
    ///
    /// An index outside the buffer (negative, or at least the buffer length) first
    /// scrolls so the line is centered, then selects it. Does nothing on an empty
    /// buffer.
    pub async fn set_selection(
        &self,
        display_index: isize,
        flags: SelectionFlags,
        char_index: usize,
    ) -> Result<(), EngineError> {
        let (len, view_size) = self.with_buffer(|b| (b.entries().len(), b.view_size()));
        if len == 0 {
            return Ok(());
        }

        let mut target = display_index;
        if display_index < 0 || display_index as usize >= len {
            let delta = display_index as f64 - (view_size / 2.0).floor();
            let shifted = self.shift_by(delta).await?;
            target -= shifted;
        }

        let mut state = self.lock();
        let ViewerState {
            buffer, selection, ..
        } = &mut *state;
        let len = buffer.entries().len();
        if len == 0 {
            return Ok(());
        }
        let index = target.clamp(0, len as isize - 1) as usize;
        selection.set_selection(buffer, index, flags, char_index);
        Ok(())
    }

    /// Select the line a bookmark names, bringing it into view first if needed.
    ///
    /// Returns the display index that was selected, or `None` when no line at or
    /// after the bookmark exists.
    pub async fn select_bookmark(&self, bookmark: Bookmark) -> Result<Option<usize>, EngineError> {
        let buffered = self.with_buffer(|b| {
            b.entries()
                .iter()
                .position(|e| e.line().matches(&bookmark))
        });
        let index = match buffered {
            Some(index) => Some(index),
            None => {
                let center = self.center_on_bookmark;
                let mode = BookmarkLookupMode::FindNearestBookmark;
                self.run("select_bookmark", |mut buffer, cancel| async move {
                    let result = buffer
                        .move_to_bookmark(&bookmark, mode, center, &cancel)
                        .await;
                    (buffer, result)
                })
                .await?
            }
        };

        if let Some(index) = index {
            let mut state = self.lock();
            let ViewerState {
                buffer, selection, ..
            } = &mut *state;
            if index < buffer.entries().len() {
                selection.set_selection(buffer, index, SelectionFlags::NONE, 0);
            }
        }
        Ok(index)
    }

    /// Drop the selection.
    pub fn clear_selection(&self) {
        self.lock().selection.clear();
    }

    // ===== Highlighting =====

    /// Replace the highlighter. Invalidates every cached range.
    pub fn set_highlighter(&self, highlighter: Option<Arc<dyn MessageHighlighter>>) {
        let mut state = self.lock();
        state.highlighter = highlighter;
        state.highlighting.invalidate();
    }

    /// Invalidate cached ranges, e.g. after the filter set changed.
    pub fn invalidate_highlighting(&self) {
        self.lock().highlighting.invalidate();
    }

    /// Highlight ranges of every buffered line, top first.
    ///
    /// Offsets are relative to the line text. Selection ranges are included and come
    /// after the highlighter's ranges.
    pub fn line_highlights(&self) -> Vec<Vec<HighlightRange>> {
        let mut state = self.lock();
        let ViewerState {
            buffer,
            selection,
            highlighting,
            highlighter,
        } = &mut *state;
        let text_mode = buffer.text_mode();
        let selected = selection.view_lines_range(buffer);
        let ends = selection.selection().map(|s| {
            let (first, last) = s.normalized();
            (first.line_char_index(), last.line_char_index())
        });

        buffer
            .entries()
            .iter()
            .map(|entry| {
                let message = entry.message();
                let span = message.text(text_mode).line_span(entry.text_line_index());
                let mut ranges: Vec<HighlightRange> = match highlighter {
                    Some(h) => highlighting
                        .get_highlighting_ranges(message, text_mode, span.clone(), |text| {
                            h.highlight(text)
                        })
                        .iter()
                        .map(|r| r.relative_to(&span))
                        .filter(|r| r.begin < r.end)
                        .collect(),
                    None => Vec::new(),
                };

                if let (Some((low, high)), Some((first_char, last_char))) = (selected, ends) {
                    let i = entry.index() as isize;
                    if low <= i && i <= high {
                        let begin = if i == low { first_char } else { 0 };
                        let end = if i == high { last_char } else { span.len() };
                        if begin < end {
                            ranges.push(HighlightRange::new(begin, end, HighlightAction::Selection));
                        }
                    }
                }
                ranges
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "viewer_tests.rs"]
mod tests;
