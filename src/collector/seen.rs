use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Bounded set of dedupe keys for items the sink has already accepted.
///
/// Only consulted when `dedupe_capacity > 0`. Least recently seen keys are
/// evicted first, so an item that keeps appearing in its feed stays cached.
pub struct RecentlySeen {
    cache: Mutex<LruCache<String, ()>>,
}

impl RecentlySeen {
    /// Returns `None` for a zero capacity (suppression disabled).
    pub fn new(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|cap| Self {
            cache: Mutex::new(LruCache::new(cap)),
        })
    }

    /// True if `key` was recorded; refreshes its recency.
    pub fn contains(&self, key: &str) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(key).is_some()
    }

    pub fn insert(&self, key: String) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(key, ());
    }

    /// Number of keys currently held, reported in the collector status.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
