//! Result caching
//!
//! A backend may own a [`ResultCache`] mapping trace fingerprints to
//! execution results. The cache is explicit per-instance state: nothing
//! is shared between backends, and [`ResultCache::clear`] invalidates it.
//! Because the fingerprint covers measurement return types and shots, two
//! traces that differ only in what they return never share an entry.

use ahash::AHashMap;
use parking_lot::Mutex;
use qtape_core::{Fingerprint, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Statistics about cache performance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Number of cache hits
    pub hits: usize,
    /// Number of cache misses
    pub misses: usize,
    /// Number of cache evictions
    pub evictions: usize,
    /// Current cache size
    pub current_size: usize,
    /// Maximum cache size
    pub max_size: usize,
}

impl CacheStatistics {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl std::fmt::Display for CacheStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Cache Statistics:")?;
        writeln!(f, "  Hits: {}", self.hits)?;
        writeln!(f, "  Misses: {}", self.misses)?;
        writeln!(f, "  Hit rate: {:.1}%", self.hit_rate())?;
        writeln!(f, "  Evictions: {}", self.evictions)?;
        writeln!(f, "  Current size: {}/{}", self.current_size, self.max_size)?;
        Ok(())
    }
}

struct CacheInner {
    max_size: usize,
    entries: AHashMap<Fingerprint, Tensor>,
    /// most recently used at the back
    lru_queue: VecDeque<Fingerprint>,
    stats: CacheStatistics,
}

impl CacheInner {
    fn touch(&mut self, fingerprint: Fingerprint) {
        self.lru_queue.retain(|fp| *fp != fingerprint);
        self.lru_queue.push_back(fingerprint);
    }
}

/// LRU cache of execution results keyed by [`Fingerprint`]
pub struct ResultCache {
    inner: Mutex<CacheInner>,
}

impl ResultCache {
    /// Create a cache holding at most `max_size` results (0 = unlimited)
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                max_size,
                entries: AHashMap::new(),
                lru_queue: VecDeque::new(),
                stats: CacheStatistics {
                    max_size,
                    ..Default::default()
                },
            }),
        }
    }

    /// Look up a result
    pub fn get(&self, fingerprint: Fingerprint) -> Option<Tensor> {
        let mut inner = self.inner.lock();
        match inner.entries.get(&fingerprint).cloned() {
            Some(result) => {
                inner.touch(fingerprint);
                inner.stats.hits += 1;
                Some(result)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Store a result, evicting the least recently used entry when full
    pub fn insert(&self, fingerprint: Fingerprint, result: Tensor) {
        let mut inner = self.inner.lock();
        if inner.max_size > 0
            && inner.entries.len() >= inner.max_size
            && !inner.entries.contains_key(&fingerprint)
        {
            if let Some(lru) = inner.lru_queue.pop_front() {
                inner.entries.remove(&lru);
                inner.stats.evictions += 1;
            }
        }
        inner.entries.insert(fingerprint, result);
        inner.touch(fingerprint);
        inner.stats.current_size = inner.entries.len();
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.lru_queue.clear();
        inner.stats.evictions += inner.stats.current_size;
        inner.stats.current_size = 0;
    }

    /// Get cache statistics
    pub fn statistics(&self) -> CacheStatistics {
        self.inner.lock().stats.clone()
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("stats", &self.statistics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qtape_core::{ops, Measurement, Operation, PauliWord, ReturnType, Trace};

    fn trace(theta: f64, m: Measurement) -> Trace {
        Trace::new(
            1,
            vec![Operation::on(&ops::RY, [theta], &[0]).unwrap()],
            vec![m],
        )
        .unwrap()
    }

    #[test]
    fn test_cache_hit() {
        let cache = ResultCache::new(10);
        let fp = trace(0.1, Measurement::expval(PauliWord::z(0))).fingerprint();

        assert!(cache.get(fp).is_none());
        assert_eq!(cache.statistics().misses, 1);

        cache.insert(fp, Tensor::scalar(0.5));
        assert_eq!(cache.get(fp), Some(Tensor::scalar(0.5)));
        assert_eq!(cache.statistics().hits, 1);
    }

    #[test]
    fn test_return_type_never_collides() {
        let cache = ResultCache::new(10);
        let e = Measurement::expval(PauliWord::z(0));
        let expval = trace(0.1, e.clone()).fingerprint();
        let var = trace(0.1, e.with_return_type(ReturnType::Variance)).fingerprint();

        cache.insert(expval, Tensor::scalar(0.99));
        assert!(cache.get(var).is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResultCache::new(2);
        let fps: Vec<_> = (0..3)
            .map(|i| trace(i as f64, Measurement::expval(PauliWord::z(0))).fingerprint())
            .collect();

        cache.insert(fps[0], Tensor::scalar(0.0));
        cache.insert(fps[1], Tensor::scalar(1.0));
        // refresh 0 so 1 is evicted
        assert!(cache.get(fps[0]).is_some());
        cache.insert(fps[2], Tensor::scalar(2.0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(fps[1]).is_none());
        assert!(cache.get(fps[0]).is_some());
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[test]
    fn test_clear() {
        let cache = ResultCache::new(0);
        let fp = trace(0.3, Measurement::probs(&[0])).fingerprint();
        cache.insert(fp, Tensor::vector(vec![1.0, 0.0]));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(fp).is_none());
    }
}
