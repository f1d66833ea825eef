//! Per-source bounded line buffer.
//!
//! A [`SourceWindow`] holds a contiguous run of one source's display lines together with
//! the byte range `[begin_position, end_position)` the run covers. An empty window keeps
//! `begin_position == end_position`: the point from which a forward read continues
//! downwards and a backward read continues upwards.
//!
//! Trimming from the top is deferred: [`SourceWindow::set_unneeded_top`] only records how
//! many leading lines are no longer needed, and [`SourceWindow::finalize`] drops them in
//! one pass together with any overflow at the bottom.

use super::display_line::DisplayLine;
use crate::model::{MessageRef, SourceError, SourceId, TextMode};
use crate::source::{EnumDirection, ReadPriority, SharedSource};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Lines read from a source together with the byte range they were read from.
#[derive(Debug, Clone)]
pub struct LinesRange {
    /// Position the read covered from.
    pub begin: u64,
    /// Position the read covered up to.
    pub end: u64,
    /// Lines in ascending order.
    pub lines: Vec<DisplayLine>,
}

/// Buffered lines of one source.
#[derive(Debug, Clone)]
pub struct SourceWindow {
    source: SharedSource,
    text_mode: TextMode,
    begin_position: u64,
    end_position: u64,
    lines: Vec<DisplayLine>,
    unneeded_top: usize,
}

impl SourceWindow {
    /// Create an empty window positioned at the source's beginning.
    pub fn new(source: SharedSource, text_mode: TextMode) -> Self {
        let begin = source.positions_range().begin;
        Self {
            source,
            text_mode,
            begin_position: begin,
            end_position: begin,
            lines: Vec::new(),
            unneeded_top: 0,
        }
    }

    /// Source this window reads from.
    pub fn source(&self) -> &SharedSource {
        &self.source
    }

    /// Id of the source.
    pub fn source_id(&self) -> SourceId {
        self.source.id()
    }

    /// Text mode lines are split under.
    pub fn text_mode(&self) -> TextMode {
        self.text_mode
    }

    /// First covered position.
    pub fn begin_position(&self) -> u64 {
        self.begin_position
    }

    /// Position just past the covered range.
    pub fn end_position(&self) -> u64 {
        self.end_position
    }

    /// Buffered lines, including the ones marked unneeded.
    pub fn lines(&self) -> &[DisplayLine] {
        &self.lines
    }

    /// Number of buffered lines, including the ones marked unneeded.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of leading lines pending removal.
    pub fn unneeded_top(&self) -> usize {
        self.unneeded_top
    }

    /// Lines that survive the next finalize's top trim.
    pub fn needed_lines(&self) -> &[DisplayLine] {
        &self.lines[self.unneeded_top.min(self.lines.len())..]
    }

    /// Replace the contents with `range`.
    pub fn set(&mut self, range: LinesRange) {
        self.begin_position = range.begin;
        self.end_position = range.end;
        self.lines = range.lines;
        self.unneeded_top = 0;
    }

    /// Drop all lines and park the window at `position`.
    pub fn reset_at(&mut self, position: u64) {
        self.set(LinesRange {
            begin: position,
            end: position,
            lines: Vec::new(),
        });
    }

    /// Switch the text mode. Buffered lines are dropped; the window stays at its begin.
    pub fn set_text_mode(&mut self, text_mode: TextMode) {
        self.text_mode = text_mode;
        let begin = self.begin_position;
        self.reset_at(begin);
    }

    /// Append lines read from the current end.
    ///
    /// # Panics
    ///
    /// Panics if `range.begin` is not the window's end position.
    pub fn append(&mut self, range: LinesRange) {
        assert_eq!(
            range.begin, self.end_position,
            "non-contiguous append to {} window",
            self.source_id()
        );
        if self.lines.is_empty() {
            self.begin_position = range.begin;
        }
        self.end_position = range.end;
        self.lines.extend(range.lines);
    }

    /// Prepend lines read backwards from the current begin.
    ///
    /// # Panics
    ///
    /// Panics if `range.end` is not the window's begin position.
    pub fn prepend(&mut self, range: LinesRange) {
        assert_eq!(
            range.end, self.begin_position,
            "non-contiguous prepend to {} window",
            self.source_id()
        );
        if self.lines.is_empty() {
            self.end_position = range.end;
        }
        self.begin_position = range.begin;
        if self.unneeded_top > 0 {
            self.unneeded_top += range.lines.len();
        }
        let mut lines = range.lines;
        lines.append(&mut self.lines);
        self.lines = lines;
    }

    /// Mark the first `count` lines as no longer needed.
    pub fn set_unneeded_top(&mut self, count: usize) {
        self.unneeded_top = count.min(self.lines.len());
    }

    /// Apply the pending top trim, then keep at most `max_lines` lines.
    pub fn finalize(&mut self, max_lines: usize) {
        let drop_top = self.unneeded_top.min(self.lines.len());
        self.unneeded_top = 0;

        let last_dropped = drop_top
            .checked_sub(1)
            .map(|i| self.lines[i].clone());
        self.lines.drain(..drop_top);

        let first_truncated = self.lines.get(max_lines).cloned();
        self.lines.truncate(max_lines);

        if let (Some(first), Some(last)) = (self.lines.first(), self.lines.last()) {
            self.begin_position = first.message().position();
            self.end_position = last.message().end_position();
        } else if let Some(line) = last_dropped {
            let position = if line.is_last_line() {
                line.message().end_position()
            } else {
                line.message().position()
            };
            self.begin_position = position;
            self.end_position = position;
        } else if let Some(line) = first_truncated {
            let position = line.message().position();
            self.begin_position = position;
            self.end_position = position;
        }
    }

    /// True if the window has read everything the source currently holds.
    pub fn is_at_stream_end(&self) -> bool {
        self.end_position >= self.source.positions_range().end
            && self.lines.last().map_or(true, |l| l.is_last_line())
    }

    /// True if nothing precedes the window in the source.
    pub fn is_at_stream_begin(&self) -> bool {
        self.begin_position <= self.source.positions_range().begin
            && self.lines.first().map_or(true, |l| l.is_first_line())
    }

    /// Add at least `count` lines below the last buffered line, if the source has them.
    pub async fn load_after(
        &mut self,
        count: usize,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        if count == 0 {
            return Ok(());
        }

        let mut added = 0;
        if let Some(last) = self.lines.last().filter(|l| !l.is_last_line()) {
            let message = last.message().clone();
            let rest: Vec<_> =
                DisplayLine::lines_of(&message, self.text_mode, last.line_index() + 1).collect();
            added += rest.len();
            self.lines.extend(rest);
        }
        if added >= count {
            return Ok(());
        }

        let range = self
            .read_forward(self.end_position, count - added, priority, cancel)
            .await?;
        self.append(range);
        Ok(())
    }

    /// Add at least `count` lines above the first buffered line, if the source has them.
    pub async fn load_before(
        &mut self,
        count: usize,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        if count == 0 {
            return Ok(());
        }

        let mut added = 0;
        if let Some(first) = self.lines.first().filter(|l| !l.is_first_line()) {
            let message = first.message().clone();
            let mut head: Vec<_> =
                DisplayLine::lines_before(&message, self.text_mode, first.line_index()).collect();
            added += head.len();
            if self.unneeded_top > 0 {
                self.unneeded_top += head.len();
            }
            head.append(&mut self.lines);
            self.lines = head;
        }
        if added >= count {
            return Ok(());
        }

        let range = self
            .read_backward(self.begin_position, count - added, priority, cancel)
            .await?;
        self.prepend(range);
        Ok(())
    }

    /// Park the window at `position` and load `before` lines above and `after` lines
    /// from it.
    pub async fn load_around(
        &mut self,
        position: u64,
        before: usize,
        after: usize,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        self.reset_at(position);
        self.load_after(after, priority, cancel).await?;
        self.load_before(before, priority, cancel).await
    }

    /// First message at or after `from`, without touching the buffer.
    pub async fn peek_forward(
        &self,
        from: u64,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<Option<MessageRef>, SourceError> {
        let mut found = None;
        self.source
            .enum_messages(
                from,
                EnumDirection::Forward,
                priority,
                &mut |m: MessageRef| {
                    found = Some(m);
                    false
                },
                cancel,
            )
            .await?;
        Ok(found)
    }

    /// Last message before `from`, without touching the buffer.
    pub async fn peek_backward(
        &self,
        from: u64,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<Option<MessageRef>, SourceError> {
        let mut found = None;
        self.source
            .enum_messages(
                from,
                EnumDirection::Backward,
                priority,
                &mut |m: MessageRef| {
                    found = Some(m);
                    false
                },
                cancel,
            )
            .await?;
        Ok(found)
    }

    async fn read_forward(
        &self,
        from: u64,
        min_lines: usize,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<LinesRange, SourceError> {
        let text_mode = self.text_mode;
        let mut lines = Vec::new();
        let mut end = from;
        self.source
            .enum_messages(
                from,
                EnumDirection::Forward,
                priority,
                &mut |m: MessageRef| {
                    end = m.end_position();
                    lines.extend(DisplayLine::lines_of(&m, text_mode, 0));
                    lines.len() < min_lines
                },
                cancel,
            )
            .await?;

        trace!(source = %self.source_id(), from, end, lines = lines.len(), "Read forward");
        Ok(LinesRange {
            begin: from,
            end,
            lines,
        })
    }

    async fn read_backward(
        &self,
        from: u64,
        min_lines: usize,
        priority: ReadPriority,
        cancel: &CancellationToken,
    ) -> Result<LinesRange, SourceError> {
        let text_mode = self.text_mode;
        let mut messages: Vec<MessageRef> = Vec::new();
        let mut line_total = 0;
        self.source
            .enum_messages(
                from,
                EnumDirection::Backward,
                priority,
                &mut |m: MessageRef| {
                    line_total += m.text(text_mode).line_count();
                    messages.push(m);
                    line_total < min_lines
                },
                cancel,
            )
            .await?;

        let begin = messages.last().map_or(from, |m| m.position());
        let lines: Vec<_> = messages
            .iter()
            .rev()
            .flat_map(|m| DisplayLine::lines_of(m, text_mode, 0))
            .collect();

        trace!(source = %self.source_id(), from, begin, lines = lines.len(), "Read backward");
        Ok(LinesRange {
            begin,
            end: from,
            lines,
        })
    }
}
