//! Dataset registry
//!
//! Holds at most one live dataset instance per UUID, together with the
//! structures derived from it (column index, result cache). Registering a
//! UUID that is already present swaps the whole entry in one step: new
//! lookups see only the new instance, while lookups already holding the old
//! entry finish against it. Nothing derived from an instance is ever patched
//! in place or shared with another instance.
//!
//! ## Concurrency
//!
//! Entries live in a sharded `DashMap`, so reads and replacements of
//! unrelated UUIDs never contend on a single lock.

use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::error::{ApiError, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tabula_db_core::{DataSet, DataSetIndex, DataSetMetadata};

/// A registered dataset instance and everything derived from it
#[derive(Debug)]
pub struct RegisteredDataSet {
    index: DataSetIndex,
    results: ResultCache,
    instance_id: u64,
    registered_at: Instant,
}

impl RegisteredDataSet {
    fn new(dataset: Arc<DataSet>, instance_id: u64, config: &EngineConfig) -> Self {
        let index = DataSetIndex::new(dataset);
        if config.eager_indexing {
            index.build_all();
        }
        Self {
            index,
            results: ResultCache::new(config.result_cache_max_entries),
            instance_id,
            registered_at: Instant::now(),
        }
    }

    pub fn dataset(&self) -> &Arc<DataSet> {
        self.index.dataset()
    }

    pub fn index(&self) -> &DataSetIndex {
        &self.index
    }

    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    /// Distinguishes successive instances registered under one UUID
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }
}

/// UUID → live dataset instance
#[derive(Debug)]
pub struct DataSetRegistry {
    entries: DashMap<String, Arc<RegisteredDataSet>>,
    next_instance: AtomicU64,
    config: EngineConfig,
}

impl Default for DataSetRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl DataSetRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            entries: DashMap::new(),
            next_instance: AtomicU64::new(1),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register `dataset` under its UUID, replacing any previous instance.
    ///
    /// The index and result cache are built for this instance before the
    /// swap, so readers never observe a half-initialized entry.
    pub fn register(&self, dataset: impl Into<Arc<DataSet>>) -> Arc<RegisteredDataSet> {
        let dataset: Arc<DataSet> = dataset.into();
        let uuid = dataset.uuid().to_string();
        let instance_id = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(RegisteredDataSet::new(dataset, instance_id, &self.config));
        let previous = self.entries.insert(uuid.clone(), entry.clone());
        match previous {
            Some(old) => tracing::debug!(
                uuid = %uuid,
                instance_id,
                replaced_instance = old.instance_id,
                rows = entry.dataset().row_count(),
                "dataset replaced"
            ),
            None => tracing::debug!(
                uuid = %uuid,
                instance_id,
                rows = entry.dataset().row_count(),
                "dataset registered"
            ),
        }
        entry
    }

    /// Remove the instance registered under `uuid`, if any
    pub fn remove(&self, uuid: &str) -> Option<Arc<RegisteredDataSet>> {
        let removed = self.entries.remove(uuid).map(|(_, entry)| entry);
        if let Some(entry) = &removed {
            tracing::debug!(uuid, instance_id = entry.instance_id, "dataset removed");
        }
        removed
    }

    /// Remove `uuid` only if `instance_id` is still the live instance
    pub fn remove_instance(&self, uuid: &str, instance_id: u64) -> bool {
        let removed = self
            .entries
            .remove_if(uuid, |_, entry| entry.instance_id == instance_id)
            .is_some();
        if removed {
            tracing::debug!(uuid, instance_id, "dataset instance removed");
        }
        removed
    }

    pub fn get(&self, uuid: &str) -> Option<Arc<DataSet>> {
        self.entry(uuid).map(|e| e.dataset().clone())
    }

    /// The full registered entry (dataset, index, results)
    pub fn entry(&self, uuid: &str) -> Option<Arc<RegisteredDataSet>> {
        self.entries.get(uuid).map(|e| e.value().clone())
    }

    pub fn metadata(&self, uuid: &str) -> Result<DataSetMetadata> {
        self.entry(uuid)
            .map(|e| e.dataset().metadata())
            .ok_or_else(|| ApiError::not_found(uuid))
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.entries.contains_key(uuid)
    }

    pub fn uuids(&self) -> Vec<String> {
        let mut uuids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        uuids.sort();
        uuids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every dataset
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        tracing::debug!(count, "registry cleared");
    }
}
