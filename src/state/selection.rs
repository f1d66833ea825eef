//! Selection and cursor model over the screen buffer.
//!
//! A [`CursorPosition`] names a character in a buffered line. Positions do not hold
//! on to display indices across buffer changes: after every change the
//! [`SelectionManager`] re-derives where each end of the selection sits in the new
//! entries, by message order while the owning source is still present and by
//! timestamp once it is gone. A selection never silently disappears on reload.
//!
//! Character indices are byte offsets into the line text and always lie on a char
//! boundary.

use crate::model::{Bookmark, MessageRef, OrderKey, TextMode};
use crate::view_state::{ScreenBuffer, ScreenBufferEntry};
use std::cmp::Ordering;
use std::ops::{BitOr, BitOrAssign};
use tracing::trace;

// ===== SelectionFlags =====

/// Modifiers for [`SelectionManager::set_selection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionFlags(u8);

impl SelectionFlags {
    /// No modifiers: place the cursor at the given character.
    pub const NONE: Self = Self(0);
    /// Move to the beginning of the line.
    pub const BEGINNING_OF_LINE: Self = Self(1);
    /// Move to the end of the line.
    pub const END_OF_LINE: Self = Self(1 << 1);
    /// Keep the selection anchor and move only the cursor end (extend).
    pub const PRESERVE_SELECTION_END: Self = Self(1 << 2);
    /// Jump to the next word boundary after the given character.
    pub const NEXT_WORD: Self = Self(1 << 3);
    /// Jump to the previous word boundary before the given character.
    pub const PREV_WORD: Self = Self(1 << 4);
    /// Do not ask the view to scroll horizontally to the cursor.
    pub const SUPPRESS_HORIZONTAL_SCROLL: Self = Self(1 << 5);
    /// Select the word under the given character.
    pub const SELECT_WORD: Self = Self(1 << 6);

    /// True if every flag in `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SelectionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SelectionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ===== CursorPosition =====

/// Where a cursor line sits relative to the buffered entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinePlacement {
    /// Above the first buffered line.
    Above,
    /// At a display index.
    At(usize),
    /// Below the last buffered line.
    Below,
}

/// A character position in the merged text, or the "no message" sentinel.
///
/// Positions are totally ordered by display placement, then text line, then
/// character. The sentinel is smaller than every other position.
#[derive(Debug, Clone)]
pub struct CursorPosition {
    message: Option<MessageRef>,
    placement: LinePlacement,
    text_line_index: usize,
    line_char_index: usize,
}

impl CursorPosition {
    /// The "no message" sentinel.
    pub fn none() -> Self {
        Self {
            message: None,
            placement: LinePlacement::Above,
            text_line_index: 0,
            line_char_index: 0,
        }
    }

    /// Position at `char_index` in a buffered entry, clamped to the line.
    pub fn at(entry: &ScreenBufferEntry, char_index: usize) -> Self {
        Self {
            message: Some(entry.message().clone()),
            placement: LinePlacement::At(entry.index()),
            text_line_index: entry.text_line_index(),
            line_char_index: floor_char_boundary(entry.text(), char_index),
        }
    }

    /// Message the position is in. `None` for the sentinel.
    pub fn message(&self) -> Option<&MessageRef> {
        self.message.as_ref()
    }

    /// Placement relative to the buffer the position was last derived against.
    pub fn placement(&self) -> LinePlacement {
        self.placement
    }

    /// Display index, if the line is buffered.
    pub fn display_index(&self) -> Option<usize> {
        match self.placement {
            LinePlacement::At(index) if self.message.is_some() => Some(index),
            _ => None,
        }
    }

    /// Text line inside the message.
    pub fn text_line_index(&self) -> usize {
        self.text_line_index
    }

    /// Byte offset inside the text line.
    pub fn line_char_index(&self) -> usize {
        self.line_char_index
    }

    /// True for the "no message" sentinel.
    pub fn is_none(&self) -> bool {
        self.message.is_none()
    }

    /// Bookmark of the line the position is on.
    pub fn bookmark(&self) -> Option<Bookmark> {
        self.message.as_ref().map(|m| m.bookmark(self.text_line_index))
    }

    fn order_key(&self) -> Option<OrderKey> {
        self.message.as_ref().map(|m| m.order_key(self.text_line_index))
    }

    fn sort_key(&self) -> Option<(LinePlacement, OrderKey, usize)> {
        self.order_key()
            .map(|key| (self.placement, key, self.line_char_index))
    }
}

impl PartialEq for CursorPosition {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for CursorPosition {}

impl PartialOrd for CursorPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CursorPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

// ===== Selection =====

/// A selection: the anchor end where it started and the cursor end that moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    first: CursorPosition,
    last: CursorPosition,
    text_mode: TextMode,
    generation: u64,
}

impl Selection {
    /// Anchor end.
    pub fn first(&self) -> &CursorPosition {
        &self.first
    }

    /// Cursor end.
    pub fn last(&self) -> &CursorPosition {
        &self.last
    }

    /// Both ends in ascending order.
    pub fn normalized(&self) -> (&CursorPosition, &CursorPosition) {
        if self.first <= self.last {
            (&self.first, &self.last)
        } else {
            (&self.last, &self.first)
        }
    }

    /// True if both ends are the same position.
    pub fn is_empty(&self) -> bool {
        self.first == self.last
    }

    /// True if both ends are on the same line.
    pub fn is_single_line(&self) -> bool {
        self.first.order_key() == self.last.order_key()
    }

    /// Text mode the selection was derived under.
    pub fn text_mode(&self) -> TextMode {
        self.text_mode
    }

    /// Buffer generation the selection was derived against.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ===== SelectionManager =====

/// Owns the selection and keeps it anchored while the buffer changes.
#[derive(Debug, Default)]
pub struct SelectionManager {
    selection: Option<Selection>,
    scroll_to_cursor: bool,
}

impl SelectionManager {
    /// Create a manager without a selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current selection.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Cursor end of the current selection.
    pub fn cursor(&self) -> Option<&CursorPosition> {
        self.selection.as_ref().map(|s| &s.last)
    }

    /// Drop the selection.
    pub fn clear(&mut self) {
        self.selection = None;
        self.scroll_to_cursor = false;
    }

    /// True if the last selection change asked the view to bring the cursor
    /// horizontally into view.
    pub fn scroll_to_cursor_requested(&self) -> bool {
        self.scroll_to_cursor
    }

    /// Place the cursor in the buffered line at `display_index`.
    ///
    /// # Panics
    ///
    /// Panics if `display_index` is not a buffered line.
    pub fn set_selection(
        &mut self,
        buffer: &ScreenBuffer,
        display_index: usize,
        flags: SelectionFlags,
        char_index: usize,
    ) {
        let entries = buffer.entries();
        assert!(
            display_index < entries.len(),
            "display index {} out of buffer (len: {})",
            display_index,
            entries.len()
        );
        let entry = &entries[display_index];
        let text = entry.text();

        let char_index = if flags.contains(SelectionFlags::BEGINNING_OF_LINE) {
            0
        } else if flags.contains(SelectionFlags::END_OF_LINE) {
            text.len()
        } else if flags.contains(SelectionFlags::NEXT_WORD) {
            next_word_boundary(text, char_index)
        } else if flags.contains(SelectionFlags::PREV_WORD) {
            prev_word_boundary(text, char_index)
        } else {
            char_index
        };

        let (first, last) = if flags.contains(SelectionFlags::SELECT_WORD) {
            let (begin, end) = word_at(text, char_index);
            (CursorPosition::at(entry, begin), CursorPosition::at(entry, end))
        } else {
            let cursor = CursorPosition::at(entry, char_index);
            let extend = flags.contains(SelectionFlags::PRESERVE_SELECTION_END);
            let first = match &self.selection {
                Some(s) if extend && !s.first.is_none() => s.first.clone(),
                _ => cursor.clone(),
            };
            (first, cursor)
        };

        trace!(
            display_index,
            char_index = last.line_char_index,
            extend = flags.contains(SelectionFlags::PRESERVE_SELECTION_END),
            "Selection set"
        );
        self.selection = Some(Selection {
            first,
            last,
            text_mode: buffer.text_mode(),
            generation: buffer.generation(),
        });
        self.scroll_to_cursor = !flags.contains(SelectionFlags::SUPPRESS_HORIZONTAL_SCROLL);
    }

    /// Re-derive the selection against a changed buffer.
    pub fn on_buffer_changed(&mut self, buffer: &ScreenBuffer) {
        let Some(selection) = &self.selection else {
            return;
        };
        if selection.generation == buffer.generation() && selection.text_mode == buffer.text_mode() {
            return;
        }

        let first = rederive(&selection.first, buffer);
        let last = rederive(&selection.last, buffer);
        trace!(
            generation = buffer.generation(),
            first = ?first.placement,
            last = ?last.placement,
            "Selection re-derived"
        );
        self.selection = Some(Selection {
            first,
            last,
            text_mode: buffer.text_mode(),
            generation: buffer.generation(),
        });
    }

    /// Inclusive display-index span of the normalized selection.
    ///
    /// An end above the buffer is reported as `-1`, an end below it as the buffer
    /// length. `None` without a selection.
    pub fn view_lines_range(&self, buffer: &ScreenBuffer) -> Option<(isize, isize)> {
        let selection = self.selection.as_ref()?;
        if selection.first.is_none() {
            return None;
        }
        let (first, last) = selection.normalized();
        let len = buffer.entries().len() as isize;
        let index = |p: &CursorPosition| match p.placement {
            LinePlacement::Above => -1,
            LinePlacement::At(i) => i as isize,
            LinePlacement::Below => len,
        };
        Some((index(first), index(last)))
    }

    /// Selected text, if both ends are buffered. Lines are joined with `\n`.
    pub fn selected_text(&self, buffer: &ScreenBuffer) -> Option<String> {
        let selection = self.selection.as_ref()?;
        let (first, last) = selection.normalized();
        let (begin, end) = (first.display_index()?, last.display_index()?);
        let entries = buffer.entries();
        if end >= entries.len() {
            return None;
        }

        if begin == end {
            let text = entries[begin].text();
            let from = first.line_char_index.min(text.len());
            let to = last.line_char_index.min(text.len()).max(from);
            return Some(text[from..to].to_string());
        }

        let mut out = String::new();
        for entry in &entries[begin..=end] {
            let text = entry.text();
            let from = if entry.index() == begin {
                first.line_char_index.min(text.len())
            } else {
                0
            };
            let to = if entry.index() == end {
                last.line_char_index.min(text.len())
            } else {
                text.len()
            };
            if entry.index() != begin {
                out.push('\n');
            }
            out.push_str(&text[from..to]);
        }
        Some(out)
    }
}

/// Find where `position` sits in `buffer`.
fn rederive(position: &CursorPosition, buffer: &ScreenBuffer) -> CursorPosition {
    let Some(message) = &position.message else {
        return position.clone();
    };
    let entries = buffer.entries();

    if !buffer.contains_source(message.source_id()) {
        // Owning source is gone: land on the first line at or after its time
        if entries.is_empty() {
            return CursorPosition::none();
        }
        let timestamp = message.timestamp();
        let i = entries.partition_point(|e| e.message().timestamp() < timestamp);
        let off_buffer = |placement| CursorPosition {
            message: Some(message.clone()),
            placement,
            text_line_index: position.text_line_index,
            line_char_index: 0,
        };
        return match entries.get(i) {
            None => off_buffer(LinePlacement::Below),
            Some(entry) if i == 0 && entry.message().timestamp() > timestamp => {
                off_buffer(LinePlacement::Above)
            }
            Some(entry) => CursorPosition::at(entry, 0),
        };
    }

    let line_count = message.text(buffer.text_mode()).line_count();
    let line = position.text_line_index.min(line_count - 1);
    let key = message.order_key(line);
    let i = entries.partition_point(|e| e.order_key() < key);

    match entries.get(i) {
        Some(entry) if entry.order_key() == key => {
            CursorPosition::at(entry, position.line_char_index)
        }
        _ if i == 0 => CursorPosition {
            message: Some(message.clone()),
            placement: LinePlacement::Above,
            text_line_index: line,
            line_char_index: position.line_char_index,
        },
        None => CursorPosition {
            message: Some(message.clone()),
            placement: LinePlacement::Below,
            text_line_index: line,
            line_char_index: position.line_char_index,
        },
        Some(entry) => CursorPosition::at(entry, 0),
    }
}

// ===== Word boundaries =====

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Start of the next word after `from`, or the end of the text.
fn next_word_boundary(text: &str, from: usize) -> usize {
    let from = floor_char_boundary(text, from);
    let mut chars = text[from..].char_indices().peekable();
    while let Some((_, c)) = chars.peek() {
        if !is_word_char(*c) {
            break;
        }
        chars.next();
    }
    while let Some((_, c)) = chars.peek() {
        if is_word_char(*c) {
            break;
        }
        chars.next();
    }
    chars.peek().map_or(text.len(), |(i, _)| from + i)
}

/// Start of the word before `from`, or zero.
fn prev_word_boundary(text: &str, from: usize) -> usize {
    let from = floor_char_boundary(text, from);
    let mut chars = text[..from].char_indices().rev().peekable();
    while let Some((_, c)) = chars.peek() {
        if is_word_char(*c) {
            break;
        }
        chars.next();
    }
    let mut start = chars.peek().map_or(0, |(i, _)| *i);
    for (i, c) in chars {
        if !is_word_char(c) {
            break;
        }
        start = i;
    }
    start
}

/// Byte span of the word containing `index`. Empty at `index` if there is none.
fn word_at(text: &str, index: usize) -> (usize, usize) {
    let index = floor_char_boundary(text, index);
    match text[index..].chars().next() {
        Some(c) if is_word_char(c) => {}
        _ => return (index, index),
    }
    let begin = text[..index]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word_char(*c))
        .last()
        .map_or(index, |(i, _)| i);
    let end = text[index..]
        .char_indices()
        .find(|(_, c)| !is_word_char(*c))
        .map_or(text.len(), |(i, _)| index + i);
    (begin, end)
}

#[cfg(test)]
#[path = "selection_tests.rs"]
mod tests;
