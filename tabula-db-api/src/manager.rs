//! Dataset manager: resolves lookups against provider-backed definitions
//!
//! The manager owns the definitions, the providers and the scheduler, and
//! drives the fetch → register → reschedule cycle:
//!
//! - a lookup whose dataset is not registered, is outdated, or whose
//!   definition has `refresh_always` fetches from the provider first;
//! - at most one fetch per UUID runs at a time, and callers that waited on
//!   a fetch reuse its result instead of fetching again;
//! - every successful fetch cancels the UUID's pending invalidation and,
//!   when the definition caches with a refresh time, schedules a new one.
//!
//! UUIDs without a definition fall through to the plain registry, so
//! datasets registered directly are looked up the same way.

use crate::config::RefreshMode;
use crate::error::{ApiError, Result};
use crate::handler::DataSetHandler;
use crate::provider::{DataSetDef, DataSetProvider};
use crate::registry::{DataSetRegistry, RegisteredDataSet};
use crate::scheduler::{DataSetInvalidationTask, ScheduledTask, Scheduler};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tabula_db_core::{DataSet, DataSetMetadata};
use tabula_db_query::DataSetLookup;
use tracing::Instrument;

#[derive(Debug)]
pub struct DataSetManager {
    handler: DataSetHandler,
    scheduler: Scheduler,
    providers: DashMap<String, Arc<dyn DataSetProvider>>,
    defs: DashMap<String, DataSetDef>,
    /// Per-UUID fetch locks
    fetch_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl DataSetManager {
    pub fn new(registry: Arc<DataSetRegistry>, scheduler: Scheduler) -> Arc<Self> {
        Arc::new(Self {
            handler: DataSetHandler::new(registry),
            scheduler,
            providers: DashMap::new(),
            defs: DashMap::new(),
            fetch_locks: DashMap::new(),
        })
    }

    pub fn registry(&self) -> &Arc<DataSetRegistry> {
        self.handler.registry()
    }

    pub fn handler(&self) -> &DataSetHandler {
        &self.handler
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn register_provider(&self, provider: Arc<dyn DataSetProvider>) {
        let key = provider.provider_type().to_string();
        tracing::debug!(provider = %key, "provider registered");
        self.providers.insert(key, provider);
    }

    /// Add or replace a definition.
    ///
    /// Any dataset fetched under the previous definition is dropped together
    /// with its pending invalidation.
    pub fn register_def(&self, def: DataSetDef) {
        let uuid = def.uuid.clone();
        self.scheduler.unschedule(&uuid);
        if self.defs.insert(uuid.clone(), def).is_some() {
            self.registry().remove(&uuid);
        }
        tracing::debug!(uuid = %uuid, "dataset definition registered");
    }

    /// Forget a definition and everything fetched for it
    pub fn remove_def(&self, uuid: &str) -> Option<DataSetDef> {
        self.scheduler.unschedule(uuid);
        self.registry().remove(uuid);
        self.fetch_locks.remove(uuid);
        self.defs.remove(uuid).map(|(_, def)| def)
    }

    pub fn def(&self, uuid: &str) -> Option<DataSetDef> {
        self.defs.get(uuid).map(|d| d.value().clone())
    }

    /// Run `lookup`, fetching its dataset from the provider when needed
    pub async fn lookup(self: &Arc<Self>, lookup: &DataSetLookup) -> Result<Arc<DataSet>> {
        let Some(def) = self.def(&lookup.dataset_uuid) else {
            return self.handler.lookup(lookup);
        };
        let provider = self.provider_for(&def)?;

        if !def.cache_enabled {
            let dataset = self.fetch(&def, &provider).await?;
            return self.handler.lookup_transient(&dataset, lookup);
        }

        let entry = self.ensure_fresh(&def, &provider).await?;
        self.handler.lookup_on(&entry, lookup)
    }

    pub async fn metadata(&self, uuid: &str) -> Result<DataSetMetadata> {
        if let Ok(metadata) = self.registry().metadata(uuid) {
            return Ok(metadata);
        }
        let def = self.def(uuid).ok_or_else(|| ApiError::not_found(uuid))?;
        let provider = self.provider_for(&def)?;
        Ok(provider.metadata(&def).await?)
    }

    /// Fetch `uuid` again and swap it in.
    ///
    /// On provider failure the registered instance stays in place, the next
    /// refresh is scheduled as if the fetch had succeeded, and the error is
    /// returned.
    pub async fn refresh(self: &Arc<Self>, uuid: &str) -> Result<Arc<RegisteredDataSet>> {
        let def = self.def(uuid).ok_or_else(|| ApiError::not_found(uuid))?;
        let provider = self.provider_for(&def)?;
        let lock = self.fetch_lock(uuid);
        let _guard = lock.lock().await;
        let result = self.fetch_and_register(&def, &provider).await;
        if let Err(e) = &result {
            tracing::warn!(
                uuid,
                error = %e,
                kept = self.registry().contains(uuid),
                "dataset refresh failed"
            );
            let live = self.registry().entry(uuid).map(|e| e.instance_id());
            self.reschedule(&def, live);
        }
        result
    }

    fn provider_for(&self, def: &DataSetDef) -> Result<Arc<dyn DataSetProvider>> {
        self.providers
            .get(&def.provider)
            .map(|p| p.value().clone())
            .ok_or_else(|| ApiError::invalid_request(format!("Unknown provider: {}", def.provider)))
    }

    fn fetch_lock(&self, uuid: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.fetch_locks
            .entry(uuid.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .value()
            .clone()
    }

    async fn ensure_fresh(
        self: &Arc<Self>,
        def: &DataSetDef,
        provider: &Arc<dyn DataSetProvider>,
    ) -> Result<Arc<RegisteredDataSet>> {
        let seen = self.registry().entry(&def.uuid);
        if let Some(entry) = &seen {
            if !def.refresh_always && !provider.is_outdated(def).await? {
                return Ok(entry.clone());
            }
        }

        let lock = self.fetch_lock(&def.uuid);
        let _guard = lock.lock().await;

        // a fetch finished while we waited: use it
        if let Some(current) = self.registry().entry(&def.uuid) {
            let seen_id = seen.as_ref().map(|e| e.instance_id());
            if seen_id != Some(current.instance_id()) {
                return Ok(current);
            }
        }
        self.fetch_and_register(def, provider).await
    }

    async fn fetch(&self, def: &DataSetDef, provider: &Arc<dyn DataSetProvider>) -> Result<DataSet> {
        let span = tracing::debug_span!(
            "dataset_fetch",
            uuid = %def.uuid,
            provider = %def.provider,
            rows = tracing::field::Empty,
            ms = tracing::field::Empty,
        );
        async {
            let start = Instant::now();
            let dataset = provider.lookup(def, None).await.map_err(ApiError::from)?;
            let dataset = if dataset.uuid() == def.uuid {
                dataset
            } else {
                dataset.with_uuid(def.uuid.clone())
            };
            let span = tracing::Span::current();
            span.record("rows", dataset.row_count());
            span.record("ms", start.elapsed().as_secs_f64() * 1000.0);
            Ok::<_, ApiError>(dataset)
        }
        .instrument(span)
        .await
    }

    async fn fetch_and_register(
        self: &Arc<Self>,
        def: &DataSetDef,
        provider: &Arc<dyn DataSetProvider>,
    ) -> Result<Arc<RegisteredDataSet>> {
        let dataset = self.fetch(def, provider).await?;
        let entry = self.registry().register(dataset);
        self.reschedule(def, Some(entry.instance_id()));
        Ok(entry)
    }

    /// Re-arm the refresh timer of `def`; `instance` is the registration it expires
    fn reschedule(self: &Arc<Self>, def: &DataSetDef, instance: Option<u64>) {
        self.scheduler.unschedule(&def.uuid);
        if !def.cache_enabled {
            return;
        }
        let Some(refresh_time) = def.refresh_time else {
            return;
        };
        let Some(delay) = refresh_time.to_std_duration() else {
            tracing::warn!(uuid = %def.uuid, %refresh_time, "refresh time is negative, not scheduled");
            return;
        };
        let task: Arc<dyn ScheduledTask> = match self.registry().config().refresh_mode {
            RefreshMode::Remove => {
                let task = DataSetInvalidationTask::new(&def.uuid, self.registry());
                Arc::new(match instance {
                    Some(instance_id) => task.for_instance(instance_id),
                    None => task,
                })
            }
            RefreshMode::Refresh => Arc::new(DataSetRefreshTask {
                uuid: def.uuid.clone(),
                manager: Arc::downgrade(self),
            }),
        };
        self.scheduler.schedule(task, delay);
    }
}

/// Re-fetches a dataset when it fires, keeping the old instance on failure
#[derive(Debug)]
struct DataSetRefreshTask {
    uuid: String,
    manager: Weak<DataSetManager>,
}

#[async_trait]
impl ScheduledTask for DataSetRefreshTask {
    fn key(&self) -> &str {
        &self.uuid
    }

    async fn run(&self) {
        if let Some(manager) = self.manager.upgrade() {
            // failure is logged by refresh
            let _ = manager.refresh(&self.uuid).await;
        }
    }
}
