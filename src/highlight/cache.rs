//! LRU cache of per-message highlight ranges.

use super::range_index::{HighlightRange, RangeIndex};
use crate::model::{Message, MessageKey, TextMode};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;
use tracing::trace;

/// Capacity used when zero is requested.
pub const DEFAULT_HIGHLIGHT_CACHE_CAPACITY: usize = 1000;

/// Key for cache lookup: the message and the text the ranges were computed on.
type CacheKey = (MessageKey, TextMode);

#[derive(Debug)]
struct CachedRanges {
    generation: u64,
    index: Arc<RangeIndex>,
}

/// Memoized highlight ranges, keyed by message identity.
///
/// Bounded capacity with LRU eviction. Bumping the generation invalidates every
/// entry at once; stale entries are recomputed on their next lookup.
#[derive(Debug)]
pub struct HighlightingCache {
    cache: LruCache<CacheKey, CachedRanges>,
    generation: u64,
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity)
        .or(NonZeroUsize::new(DEFAULT_HIGHLIGHT_CACHE_CAPACITY))
        .unwrap_or(NonZeroUsize::MIN)
}

impl HighlightingCache {
    /// Create a cache holding up to `capacity` messages.
    ///
    /// If capacity is 0, uses default of 1000.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(non_zero(capacity)),
            generation: 0,
        }
    }

    /// Maximum number of cached messages.
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// Grow the capacity to at least `min_capacity`. Never shrinks.
    pub fn ensure_capacity(&mut self, min_capacity: usize) {
        if min_capacity > self.capacity() {
            self.cache.resize(non_zero(min_capacity));
        }
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Invalidate every cached entry.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        trace!(generation = self.generation, "Highlighting cache invalidated");
    }

    /// Number of cached messages, stale ones included.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Highlight ranges of `message` overlapping `interval`.
    ///
    /// On a miss `produce` runs once over the whole message text and its result is
    /// cached; on a hit only the interval is queried.
    pub fn get_highlighting_ranges<F>(
        &mut self,
        message: &Message,
        text_mode: TextMode,
        interval: Range<usize>,
        produce: F,
    ) -> Vec<HighlightRange>
    where
        F: FnOnce(&str) -> Vec<HighlightRange>,
    {
        let key = (message.key(), text_mode);
        let index = match self.cache.get(&key) {
            Some(cached) if cached.generation == self.generation => cached.index.clone(),
            _ => {
                let index = Arc::new(RangeIndex::new(produce(message.text(text_mode).as_str())));
                trace!(message = %key.0, ranges = index.len(), "Highlight ranges computed");
                self.cache.put(
                    key,
                    CachedRanges {
                        generation: self.generation,
                        index: index.clone(),
                    },
                );
                index
            }
        };
        index.query(interval.start, interval.end).copied().collect()
    }
}

impl Default for HighlightingCache {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_CACHE_CAPACITY)
    }
}
