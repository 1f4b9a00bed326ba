//! Dataset handler: resolves a lookup's dataset and runs it through the
//! result cache
//!
//! A lookup binds to the registered instance it resolves at the start and
//! uses that instance (dataset, index, result cache) until it returns,
//! whatever happens to the registry in the meantime.

use crate::error::{ApiError, Result};
use crate::registry::{DataSetRegistry, RegisteredDataSet};
use std::sync::Arc;
use std::time::Instant;
use tabula_db_core::{DataSet, DataSetMetadata};
use tabula_db_query::{execute, DataSetLookup, QueryOptions};

#[derive(Debug, Clone)]
pub struct DataSetHandler {
    registry: Arc<DataSetRegistry>,
    options: QueryOptions,
}

impl DataSetHandler {
    pub fn new(registry: Arc<DataSetRegistry>) -> Self {
        let options = registry.config().query.clone();
        Self { registry, options }
    }

    /// Override the query options taken from the registry config
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<DataSetRegistry> {
        &self.registry
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Run `lookup` against its registered dataset.
    ///
    /// Fails with `NotFound` when the UUID is not registered. Identical
    /// concurrent lookups share one computation. Lookups with a TIME_FRAME
    /// predicate depend on the clock and are never served from the cache.
    pub fn lookup(&self, lookup: &DataSetLookup) -> Result<Arc<DataSet>> {
        let entry = self
            .registry
            .entry(&lookup.dataset_uuid)
            .ok_or_else(|| ApiError::not_found(&lookup.dataset_uuid))?;
        self.lookup_on(&entry, lookup)
    }

    /// Run `lookup` against a specific registered instance
    pub fn lookup_on(&self, entry: &RegisteredDataSet, lookup: &DataSetLookup) -> Result<Arc<DataSet>> {
        let fingerprint = lookup.fingerprint();
        let span = tracing::debug_span!(
            "dataset_lookup",
            uuid = %lookup.dataset_uuid,
            instance_id = entry.instance_id(),
            fingerprint = %fingerprint,
            cache_hit = tracing::field::Empty,
            ms = tracing::field::Empty,
        );
        let _guard = span.enter();
        let start = Instant::now();

        let compute = || {
            execute(entry.dataset(), Some(entry.index()), lookup, &self.options).map_err(ApiError::from)
        };
        let (result, cache_hit) = if lookup.is_time_dependent() {
            (Arc::new(compute()?), false)
        } else {
            entry.results().get_or_compute(fingerprint, compute)?
        };

        span.record("cache_hit", cache_hit);
        span.record("ms", start.elapsed().as_secs_f64() * 1000.0);
        Ok(result)
    }

    /// Run `lookup` on a dataset that is not registered (no index, no cache)
    pub fn lookup_transient(&self, dataset: &DataSet, lookup: &DataSetLookup) -> Result<Arc<DataSet>> {
        let _span = tracing::debug_span!("dataset_lookup_transient", uuid = %dataset.uuid()).entered();
        execute(dataset, None, lookup, &self.options)
            .map(Arc::new)
            .map_err(ApiError::from)
    }

    pub fn metadata(&self, uuid: &str) -> Result<DataSetMetadata> {
        self.registry.metadata(uuid)
    }
}
