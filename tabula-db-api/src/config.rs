//! Engine configuration

use tabula_db_query::{NullOrdering, QueryOptions};

/// What a scheduled invalidation does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Drop the registered dataset; the next lookup re-fetches it
    #[default]
    Remove,
    /// Re-fetch through the provider and swap in the new instance.
    /// A provider failure keeps the previous instance.
    Refresh,
}

/// Configuration for the dataset engine
#[derive(Clone)]
pub struct EngineConfig {
    /// Result cache capacity per dataset instance (default: 256)
    ///
    /// Override with `TABULA_RESULT_CACHE_ENTRIES`.
    pub result_cache_max_entries: u64,
    /// Build every column index at registration instead of on first use
    ///
    /// Override with `TABULA_EAGER_INDEXING` (`true`/`false`).
    pub eager_indexing: bool,
    /// Semantics knobs passed to every lookup
    pub query: QueryOptions,
    pub refresh_mode: RefreshMode,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("result_cache_max_entries", &self.result_cache_max_entries)
            .field("eager_indexing", &self.eager_indexing)
            .field("use_indices", &self.query.use_indices)
            .field("like_case_sensitive", &self.query.like_case_sensitive)
            .field("null_ordering", &self.query.null_ordering)
            .field("fixed_clock", &self.query.now.is_some())
            .field("refresh_mode", &self.refresh_mode)
            .finish()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let result_cache_max_entries: u64 = std::env::var("TABULA_RESULT_CACHE_ENTRIES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(256);
        let eager_indexing = std::env::var("TABULA_EAGER_INDEXING")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            result_cache_max_entries,
            eager_indexing,
            query: QueryOptions::default(),
            refresh_mode: RefreshMode::Remove,
        }
    }
}

impl EngineConfig {
    pub fn with_null_ordering(mut self, ordering: NullOrdering) -> Self {
        self.query.null_ordering = ordering;
        self
    }

    pub fn with_like_case_sensitive(mut self, sensitive: bool) -> Self {
        self.query.like_case_sensitive = sensitive;
        self
    }

    pub fn with_refresh_mode(mut self, mode: RefreshMode) -> Self {
        self.refresh_mode = mode;
        self
    }

    pub fn with_result_cache_max_entries(mut self, entries: u64) -> Self {
        self.result_cache_max_entries = entries;
        self
    }

    pub fn with_eager_indexing(mut self, eager: bool) -> Self {
        self.eager_indexing = eager;
        self
    }
}
