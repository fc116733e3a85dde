use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Thread-safe LRU cache for query embeddings.
///
/// Keyed by model and query text so that switching models never serves a
/// vector from the wrong space. A capacity of 0 disables caching.
pub struct QueryEmbeddingCache {
    cache: Option<Mutex<LruCache<(String, String), Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // Recovers from a poisoned lock
    fn lock(
        cache: &Mutex<LruCache<(String, String), Vec<f32>>>,
    ) -> MutexGuard<'_, LruCache<(String, String), Vec<f32>>> {
        cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, model: &str, query: &str) -> Option<Vec<f32>> {
        let found = self.cache.as_ref().and_then(|cache| {
            Self::lock(cache)
                .get(&(model.to_string(), query.to_string()))
                .cloned()
        });

        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn put(&self, model: &str, query: &str, embedding: Vec<f32>) {
        if let Some(cache) = &self.cache {
            Self::lock(cache).put((model.to_string(), query.to_string()), embedding);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.as_ref().map(|c| Self::lock(c).len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}
