//! Embedding seam and query-embedding cache.
//!
//! The engine never loads or runs a model. It consumes the one-function
//! interface "text in, fixed-width vector out" and caches results by exact
//! text so repeated queries skip the embedder entirely.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::error::RecallError;

/// Default capacity for the query-embedding cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Anything that can turn text into a fixed-width vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, RecallError>;

    /// Width of the vectors this embedder produces.
    fn dimensions(&self) -> usize;
}

/// LRU cache keyed by exact text equality.
pub struct EmbeddingCache {
    inner: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(text).cloned()
    }

    pub fn put(&self, text: &str, vector: Vec<f32>) {
        let mut cache = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(text.to_string(), vector);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_round_trip() {
        let cache = EmbeddingCache::new(2);
        assert!(cache.get("query").is_none());

        cache.put("query", vec![0.1, 0.2]);
        assert_eq!(cache.get("query"), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        // Touch "a" so "b" becomes the eviction candidate
        let _ = cache.get("a");
        cache.put("c", vec![3.0]);

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let cache = EmbeddingCache::new(0);
        cache.put("x", vec![1.0]);
        assert_eq!(cache.len(), 1);
    }
}
