//! Delayed task scheduler
//!
//! Each pending task is stored under a key together with a generation
//! number and the abort handle of its timer. Scheduling a key that is
//! already pending aborts the old timer, so a key has at most one pending
//! task. A timer that fires removes its own entry only when the stored
//! generation is still its own, which keeps a late-firing superseded timer
//! from clobbering its replacement.

use crate::error::{ApiError, Result};
use crate::registry::DataSetRegistry;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

/// Work run once when its delay elapses
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Key under which the task is pending; one pending task per key
    fn key(&self) -> &str;

    async fn run(&self);
}

#[derive(Debug)]
struct ScheduledEntry {
    generation: u64,
    abort: AbortHandle,
}

type TaskMap = DashMap<String, ScheduledEntry>;

/// Cancelable handle to one scheduled task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    key: String,
    generation: u64,
    abort: AbortHandle,
    tasks: Arc<TaskMap>,
}

impl TaskHandle {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cancel this task if it has not fired yet.
    ///
    /// Has no effect on a newer task scheduled under the same key.
    pub fn cancel(&self) {
        self.abort.abort();
        self.tasks
            .remove_if(&self.key, |_, entry| entry.generation == self.generation);
    }

    /// Whether the timer has fired and its task completed, or was aborted
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

pub struct Scheduler {
    runtime: Handle,
    tasks: Arc<TaskMap>,
    next_generation: AtomicU64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Scheduler spawning its timers on `runtime`
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Scheduler bound to the runtime of the calling context
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| ApiError::internal(format!("Scheduler requires a tokio runtime: {e}")))?;
        Ok(Self::new(runtime))
    }

    /// Run `task` once after `delay`, replacing any task pending under its key
    pub fn schedule(&self, task: Arc<dyn ScheduledTask>, delay: Duration) -> TaskHandle {
        let key = task.key().to_string();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // The shard guard is held across `spawn` so the timer cannot claim its
        // generation before it is stored; a zero-delay timer would otherwise
        // find no entry and be lost. `spawn` does not block, so a timer waking
        // inside this window waits on the shard lock only until the insert below.
        let slot = self.tasks.entry(key.clone());
        let tasks = Arc::clone(&self.tasks);
        let timer_key = key.clone();
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let current = tasks
                .remove_if(&timer_key, |_, entry| entry.generation == generation)
                .is_some();
            if !current {
                return;
            }
            tracing::debug!(key = %timer_key, generation, "scheduled task fired");
            task.run().await;
        });
        let abort = join.abort_handle();
        let scheduled = ScheduledEntry {
            generation,
            abort: abort.clone(),
        };
        match slot {
            Entry::Occupied(mut occupied) => {
                let previous = occupied.insert(scheduled);
                previous.abort.abort();
                tracing::debug!(key = %key, generation, ?delay, "scheduled task replaced");
            }
            Entry::Vacant(vacant) => {
                vacant.insert(scheduled);
                tracing::debug!(key = %key, generation, ?delay, "task scheduled");
            }
        }

        TaskHandle {
            key,
            generation,
            abort,
            tasks: Arc::clone(&self.tasks),
        }
    }

    /// Cancel the task pending under `key`; no-op when nothing is pending
    pub fn unschedule(&self, key: &str) -> bool {
        match self.tasks.remove(key) {
            Some((_, entry)) => {
                entry.abort.abort();
                tracing::debug!(key, generation = entry.generation, "task unscheduled");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, key: &str) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Abort every pending task
    pub fn shutdown(&self) {
        let keys: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        let mut aborted = 0usize;
        for key in keys {
            if let Some((_, entry)) = self.tasks.remove(&key) {
                entry.abort.abort();
                aborted += 1;
            }
        }
        tracing::debug!(aborted, "scheduler shut down");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Removes a dataset from the registry when it fires
///
/// The next lookup of the UUID then misses and forces a fresh fetch.
/// A task bound to an instance leaves any later registration alone.
#[derive(Debug)]
pub struct DataSetInvalidationTask {
    uuid: String,
    instance_id: Option<u64>,
    registry: Weak<DataSetRegistry>,
}

impl DataSetInvalidationTask {
    pub fn new(uuid: impl Into<String>, registry: &Arc<DataSetRegistry>) -> Self {
        Self {
            uuid: uuid.into(),
            instance_id: None,
            registry: Arc::downgrade(registry),
        }
    }

    /// Only invalidate while `instance_id` is the live instance
    pub fn for_instance(mut self, instance_id: u64) -> Self {
        self.instance_id = Some(instance_id);
        self
    }
}

#[async_trait]
impl ScheduledTask for DataSetInvalidationTask {
    fn key(&self) -> &str {
        &self.uuid
    }

    async fn run(&self) {
        // registry already dropped: nothing left to invalidate
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        match self.instance_id {
            Some(instance_id) => {
                if !registry.remove_instance(&self.uuid, instance_id) {
                    tracing::debug!(uuid = %self.uuid, instance_id, "invalidation skipped, instance replaced");
                }
            }
            None => {
                registry.remove(&self.uuid);
            }
        }
    }
}
