//! View-state layer - the merged, scrollable window over all sources
//!
//! This module holds everything between the raw message sources and what a view
//! draws: per-source windows of display lines, the k-way merge that orders them, and
//! the screen buffer that keeps exactly enough merged lines to fill the view.
//!
//! # Module Structure
//!
//! - `display_line`: DisplayLine - one text line of one message
//! - `source_window`: SourceWindow - contiguous run of lines from one source
//! - `merge`: merge_forward / merge_backward - lazy k-way merge of windows
//! - `buffer_position`: ScrollProfile - proportional scroll position math
//! - `screen_buffer`: ScreenBuffer - cancellable, atomic navigation over the merge

pub mod buffer_position;
pub mod display_line;
pub mod merge;
pub mod screen_buffer;
pub mod source_window;

pub use buffer_position::ScrollProfile;
pub use display_line::DisplayLine;
pub use merge::{merge_backward, merge_forward, MergedLine};
pub use screen_buffer::{
    capacity_for, BookmarkLookupMode, InitialBufferPosition, ScreenBuffer, ScreenBufferEntry,
    DEFAULT_POSITION_SEARCH_ITERATIONS, MAX_SCROLLED_FRACTION,
};
pub use source_window::{LinesRange, SourceWindow};
