//! Highlighters: the producers behind the highlighting cache.

use super::range_index::{HighlightAction, HighlightRange};
use std::fmt;

/// Computes the highlight ranges of a full message text.
///
/// Runs on cache misses only, over the whole message, so it may be expensive.
pub trait MessageHighlighter: Send + Sync + fmt::Debug {
    /// Ranges (byte offsets into `text`) to highlight.
    fn highlight(&self, text: &str) -> Vec<HighlightRange>;
}

// ===== SearchHighlighter =====

/// Case-insensitive substring search. Never empty.
#[derive(Debug, Clone)]
pub struct SearchHighlighter {
    query: String,
    query_lower: String,
}

impl SearchHighlighter {
    /// Smart constructor: returns None if query is empty or whitespace-only.
    pub fn new(query: impl Into<String>) -> Option<Self> {
        let query = query.into();
        if query.trim().is_empty() {
            return None;
        }
        let query_lower = query.to_lowercase();
        Some(Self { query, query_lower })
    }

    /// The query as given.
    pub fn query(&self) -> &str {
        &self.query
    }
}

impl MessageHighlighter for SearchHighlighter {
    /// All overlapping matches of the query.
    fn highlight(&self, text: &str) -> Vec<HighlightRange> {
        // Lowercasing can change byte lengths, so keep the origin of every lowered byte
        let mut lowered = String::with_capacity(text.len());
        let mut origin = Vec::with_capacity(text.len() + 1);
        for (i, c) in text.char_indices() {
            for lower in c.to_lowercase() {
                lowered.push(lower);
                origin.resize(lowered.len(), i);
            }
        }
        origin.push(text.len());

        let mut matches = Vec::new();
        let mut start = 0;
        while let Some(pos) = lowered[start..].find(&self.query_lower) {
            let begin = start + pos;
            let end = begin + self.query_lower.len();
            let original_begin = origin[begin];
            let mut original_end = origin[end];
            if original_end <= original_begin {
                // Match inside the expansion of a single char: cover that char
                original_end = original_begin
                    + text[original_begin..].chars().next().map_or(0, char::len_utf8);
            }
            matches.push(HighlightRange::new(
                original_begin,
                original_end,
                HighlightAction::SearchResult,
            ));
            // Step one char to find overlapping matches
            start = begin + lowered[begin..].chars().next().map_or(1, char::len_utf8);
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(highlighter: &SearchHighlighter, text: &str) -> Vec<(usize, usize)> {
        highlighter
            .highlight(text)
            .iter()
            .map(|r| (r.begin, r.end))
            .collect()
    }

    // ===== Construction Tests =====

    #[test]
    fn empty_or_whitespace_query_is_rejected() {
        assert!(SearchHighlighter::new("").is_none());
        assert!(SearchHighlighter::new(" \t").is_none());
    }

    #[test]
    fn query_is_preserved() {
        let highlighter = SearchHighlighter::new("  Err ").unwrap();
        assert_eq!(highlighter.query(), "  Err ");
    }

    // ===== Matching Tests =====

    #[test]
    fn matches_case_insensitively() {
        let highlighter = SearchHighlighter::new("error").unwrap();
        assert_eq!(spans(&highlighter, "ERROR: disk Error"), vec![(0, 5), (12, 17)]);
    }

    #[test]
    fn finds_overlapping_matches() {
        let highlighter = SearchHighlighter::new("aa").unwrap();
        assert_eq!(spans(&highlighter, "aaaa"), vec![(0, 2), (1, 3), (2, 4)]);
    }

    #[test]
    fn offsets_stay_on_char_boundaries() {
        let highlighter = SearchHighlighter::new("wörld").unwrap();
        let text = "héllo WÖRLD";
        let found = highlighter.highlight(text);
        assert_eq!(found.len(), 1);
        assert_eq!(&text[found[0].begin..found[0].end], "WÖRLD");
    }

    #[test]
    fn no_match_yields_nothing() {
        let highlighter = SearchHighlighter::new("missing").unwrap();
        assert!(highlighter.highlight("nothing here").is_empty());
    }

    #[test]
    fn results_are_search_actions() {
        let highlighter = SearchHighlighter::new("a").unwrap();
        assert!(highlighter
            .highlight("banana")
            .iter()
            .all(|r| r.action == HighlightAction::SearchResult));
    }
}
