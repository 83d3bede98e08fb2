//! Bounded LRU cache of final answers keyed by normalized query text.
//!
//! No time-based expiry: an answer stays until capacity pressure evicts it
//! or the process exits. The query loop is the only reader and writer.

use lru::LruCache;
use std::num::NonZeroUsize;

/// Trim and case-fold a query. Both cache lookups and stores use this.
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

pub struct ResultCache {
    entries: LruCache<String, String>,
}

impl ResultCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up an answer, marking it most recently used.
    pub fn get(&mut self, query: &str) -> Option<String> {
        self.entries.get(&normalize_query(query)).cloned()
    }

    pub fn put(&mut self, query: &str, answer: impl Into<String>) {
        self.entries.put(normalize_query(query), answer.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case_and_surrounding_whitespace() {
        let mut cache = ResultCache::new(4);
        cache.put("eur/usd outlook", "X");
        assert_eq!(cache.get("EUR/USD Outlook").as_deref(), Some("X"));
        assert_eq!(cache.get("  eur/usd OUTLOOK \n").as_deref(), Some("X"));
        assert_eq!(cache.get("gbp/usd outlook"), None);
    }

    #[test]
    fn least_recently_used_entry_is_evicted_first() {
        let mut cache = ResultCache::new(2);
        cache.put("a", "1");
        cache.put("b", "2");
        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get("a").is_some());
        cache.put("c", "3");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut cache = ResultCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put("q", "a");
        assert_eq!(cache.get("Q").as_deref(), Some("a"));
    }
}
