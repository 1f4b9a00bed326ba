//! Per-instance result cache with single-flight computation
//!
//! Results are keyed by lookup [`Fingerprint`]. Concurrent requests for the
//! same fingerprint share one computation: the first caller computes, the
//! rest block until it finishes and receive the same result (or the same
//! error). Errors are never stored, so a failed lookup is recomputed on the
//! next request.
//!
//! One cache belongs to one registered dataset instance and is dropped with
//! it, which is what makes a replaced dataset's results unreachable.

use crate::error::{ApiError, Result};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use tabula_db_core::DataSet;
use tabula_db_query::Fingerprint;

/// Cache statistics snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a stored result
    pub hits: u64,
    /// Lookups that found no stored result
    pub misses: u64,
    /// Pipeline executions actually run (≤ misses under single-flight)
    pub computations: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicCacheStats {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Relaxed),
            misses: self.misses.load(Relaxed),
            computations: self.computations.load(Relaxed),
            evictions: self.evictions.load(Relaxed),
        }
    }
}

pub struct ResultCache {
    cache: moka::sync::Cache<Fingerprint, Arc<DataSet>>,
    stats: Arc<AtomicCacheStats>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("entry_count", &self.cache.entry_count())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl ResultCache {
    /// Create a cache holding at most `max_entries` results (LFU-ish eviction)
    pub fn new(max_entries: u64) -> Self {
        let stats = Arc::new(AtomicCacheStats::default());
        let eviction_stats = stats.clone();
        let cache = moka::sync::Cache::builder()
            .max_capacity(max_entries)
            .eviction_listener(move |_key, _value, cause| {
                if cause.was_evicted() {
                    eviction_stats.evictions.fetch_add(1, Relaxed);
                }
            })
            .build();
        Self { cache, stats }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<Arc<DataSet>> {
        self.cache.get(key)
    }

    /// Return the stored result for `key`, computing it at most once.
    ///
    /// The flag is `true` when the result was already stored.
    pub fn get_or_compute<F>(&self, key: Fingerprint, compute: F) -> Result<(Arc<DataSet>, bool)>
    where
        F: FnOnce() -> Result<DataSet>,
    {
        if let Some(hit) = self.cache.get(&key) {
            self.stats.hits.fetch_add(1, Relaxed);
            return Ok((hit, true));
        }
        self.stats.misses.fetch_add(1, Relaxed);
        let stats = &self.stats;
        self.cache
            .try_get_with(key, || {
                stats.computations.fetch_add(1, Relaxed);
                compute().map(Arc::new)
            })
            .map(|result| (result, false))
            .map_err(|e: Arc<ApiError>| (*e).clone())
    }

    /// Drop every stored result
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
    }

    /// Number of stored results
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
