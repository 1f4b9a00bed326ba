//! Dataset definitions and the provider seam
//!
//! A provider materializes the dataset described by a [`DataSetDef`]. The
//! engine treats providers as opaque suppliers: it never inspects how a
//! dataset was produced, only when to ask for a fresh one.

use crate::error::ProviderError;
use async_trait::async_trait;
use tabula_db_core::{DataSet, DataSetMetadata};
use tabula_db_query::{DataSetLookup, TimeAmount};

/// How to obtain (and how long to keep) one dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetDef {
    pub uuid: String,
    pub name: Option<String>,
    /// Key of the [`DataSetProvider`] that materializes this dataset
    pub provider: String,
    /// Keep the fetched dataset registered between lookups
    pub cache_enabled: bool,
    /// Invalidate the registered dataset this long after each fetch
    pub refresh_time: Option<TimeAmount>,
    /// Fetch again on every lookup
    pub refresh_always: bool,
}

impl DataSetDef {
    pub fn new(uuid: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: None,
            provider: provider.into(),
            cache_enabled: true,
            refresh_time: None,
            refresh_always: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_refresh_time(mut self, refresh_time: TimeAmount) -> Self {
        self.refresh_time = Some(refresh_time);
        self
    }

    pub fn with_refresh_always(mut self, always: bool) -> Self {
        self.refresh_always = always;
        self
    }
}

#[async_trait]
pub trait DataSetProvider: Send + Sync + std::fmt::Debug {
    /// Key that [`DataSetDef::provider`] refers to
    fn provider_type(&self) -> &str;

    /// Materialize the dataset for `def`.
    ///
    /// `lookup` is a hint a provider may push down to its source; the engine
    /// always applies the lookup itself and only ever passes `None` when it
    /// fetches a dataset for registration.
    async fn lookup(
        &self,
        def: &DataSetDef,
        lookup: Option<&DataSetLookup>,
    ) -> std::result::Result<DataSet, ProviderError>;

    /// Describe the dataset without keeping it
    async fn metadata(&self, def: &DataSetDef) -> std::result::Result<DataSetMetadata, ProviderError> {
        self.lookup(def, None).await.map(|ds| ds.metadata())
    }

    /// Whether the registered copy of `def` must be fetched again
    async fn is_outdated(&self, _def: &DataSetDef) -> std::result::Result<bool, ProviderError> {
        Ok(false)
    }
}
