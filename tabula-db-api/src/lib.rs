//! # Tabula DB API
//!
//! Coordination layer around the lookup pipeline:
//!
//! - [`DataSetRegistry`]: one live instance per UUID, each with its own
//!   column index and result cache, swapped atomically on re-registration
//! - [`DataSetHandler`]: runs a lookup against the instance it resolves,
//!   sharing identical concurrent computations through [`ResultCache`]
//! - [`Scheduler`]: delayed, cancelable, per-key tasks used to invalidate
//!   or refresh datasets
//! - [`DataSetManager`]: provider-backed definitions, fetching on demand
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabula_db_api::{DataSetHandler, DataSetRegistry};
//! use tabula_db_core::DataSetBuilder;
//! use tabula_db_query::{DataSetLookup, FilterNode};
//!
//! # fn main() -> tabula_db_api::Result<()> {
//! let registry = Arc::new(DataSetRegistry::default());
//! registry.register(
//!     DataSetBuilder::new("expenses")
//!         .label("dept")
//!         .number("amount")
//!         .row(vec!["Sales".into(), 10.0.into()])
//!         .build()?,
//! );
//!
//! let handler = DataSetHandler::new(registry);
//! let result = handler.lookup(
//!     &DataSetLookup::new("expenses").filter(FilterNode::greater_than("amount", 5.0)),
//! )?;
//! assert_eq!(result.row_count(), 1);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod scheduler;

pub use cache::{CacheStats, ResultCache};
pub use config::{EngineConfig, RefreshMode};
pub use error::{ApiError, ProviderError, Result};
pub use handler::DataSetHandler;
pub use manager::DataSetManager;
pub use provider::{DataSetDef, DataSetProvider};
pub use registry::{DataSetRegistry, RegisteredDataSet};
pub use scheduler::{DataSetInvalidationTask, ScheduledTask, Scheduler, TaskHandle};
