//! Highlighting: per-message ranges for search hits, filters and selection.
//!
//! A [`MessageHighlighter`] computes the ranges of a whole message; the
//! [`HighlightingCache`] memoizes them per message and answers interval queries for
//! the lines that are actually visible.

pub mod cache;
pub mod range_index;
pub mod search;

pub use cache::{HighlightingCache, DEFAULT_HIGHLIGHT_CACHE_CAPACITY};
pub use range_index::{HighlightAction, HighlightRange, RangeIndex};
pub use search::{MessageHighlighter, SearchHighlighter};
