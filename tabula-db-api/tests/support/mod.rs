//! Shared harness for tabula-db-api integration tests: dataset fixtures, a
//! scriptable provider and log initialization.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tabula_db_api::{DataSetDef, DataSetProvider, ProviderError};
use tabula_db_core::{DataSet, DataSetBuilder};
use tabula_db_query::DataSetLookup;

/// Route engine logs to the test writer; `RUST_LOG` picks the level
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// department(LABEL), amount(NUMBER); `amounts.len()` rows
pub fn expenses(uuid: &str, amounts: &[f64]) -> DataSet {
    let departments = ["Engineering", "Sales", "Support"];
    let mut builder = DataSetBuilder::new(uuid).label("department").number("amount");
    for (i, amount) in amounts.iter().enumerate() {
        builder = builder.row(vec![departments[i % departments.len()].into(), (*amount).into()]);
    }
    builder.build().unwrap()
}

/// Provider whose next dataset, failure mode and staleness are set by the test
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    fetches: AtomicUsize,
    version: AtomicUsize,
    failing: AtomicBool,
    outdated: AtomicBool,
    /// Yield this many times inside each fetch, to widen race windows
    yields: usize,
}

impl MockProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_yields(name, 0)
    }

    pub fn with_yields(name: &str, yields: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fetches: AtomicUsize::new(0),
            version: AtomicUsize::new(1),
            failing: AtomicBool::new(false),
            outdated: AtomicBool::new(false),
            yields,
        })
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Next fetch returns `version` rows
    pub fn set_version(&self, version: usize) {
        self.version.store(version, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_outdated(&self, outdated: bool) {
        self.outdated.store(outdated, Ordering::SeqCst);
    }
}

#[async_trait]
impl DataSetProvider for MockProvider {
    fn provider_type(&self) -> &str {
        &self.name
    }

    async fn lookup(
        &self,
        def: &DataSetDef,
        _lookup: Option<&DataSetLookup>,
    ) -> Result<DataSet, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.yields {
            tokio::task::yield_now().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::new(&self.name, &def.uuid, "source unavailable"));
        }
        let rows = self.version.load(Ordering::SeqCst);
        let amounts: Vec<f64> = (1..=rows).map(|i| i as f64 * 10.0).collect();
        // provider-side uuid differs on purpose: the manager rebinds it
        Ok(expenses("provider-side", &amounts))
    }

    async fn is_outdated(&self, _def: &DataSetDef) -> Result<bool, ProviderError> {
        Ok(self.outdated.swap(false, Ordering::SeqCst))
    }
}

/// Numeric values of `column`, nulls skipped
pub fn numbers(ds: &DataSet, column: &str) -> Vec<f64> {
    ds.column(column)
        .unwrap()
        .values()
        .iter()
        .filter_map(|v| v.as_number())
        .collect()
}

pub fn labels(ds: &DataSet, column: &str) -> Vec<String> {
    ds.column(column)
        .unwrap()
        .values()
        .iter()
        .map(|v| v.to_string())
        .collect()
}
