//! Per-column value indices
//!
//! A [`DataSetIndex`] belongs to exactly one [`DataSet`] instance. Column
//! indices are built on first use (or all at once via
//! [`DataSetIndex::build_all`]) and are read-only afterwards, so concurrent
//! readers never observe a partially built index.

use crate::dataset::DataSet;
use crate::row_set::RowSet;
use crate::value::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Sorted mapping from each distinct value of a column to its rows
#[derive(Debug, Default)]
pub struct ColumnIndex {
    entries: BTreeMap<Value, Vec<usize>>,
}

impl ColumnIndex {
    pub fn build(values: &[Value]) -> Self {
        let mut entries: BTreeMap<Value, Vec<usize>> = BTreeMap::new();
        for (row, v) in values.iter().enumerate() {
            entries.entry(v.clone()).or_default().push(row);
        }
        Self { entries }
    }

    /// Number of distinct values, null included
    pub fn distinct_count(&self) -> usize {
        self.entries.len()
    }

    pub fn distinct_values(&self) -> impl Iterator<Item = &Value> {
        self.entries.keys()
    }

    pub fn rows_eq(&self, value: &Value) -> RowSet {
        self.entries
            .get(value)
            .map(|rows| RowSet::from_sorted(rows.clone()))
            .unwrap_or_default()
    }

    pub fn rows_in(&self, values: &[Value]) -> RowSet {
        let mut rows = Vec::new();
        for v in values {
            if let Some(r) = self.entries.get(v) {
                rows.extend_from_slice(r);
            }
        }
        RowSet::from_unsorted(rows)
    }

    pub fn rows_null(&self) -> RowSet {
        self.rows_eq(&Value::Null)
    }

    /// Non-null rows whose value lies within the bounds
    pub fn rows_range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> RowSet {
        static NULL: Value = Value::Null;
        let lower = match lower {
            Bound::Unbounded | Bound::Included(Value::Null) => Bound::Excluded(&NULL),
            b => b,
        };
        if !range_is_valid(lower, upper) {
            return RowSet::new();
        }
        let mut rows = Vec::new();
        for (_, r) in self.entries.range::<Value, _>((lower, upper)) {
            rows.extend_from_slice(r);
        }
        RowSet::from_unsorted(rows)
    }
}

// BTreeMap::range panics on inverted or empty-excluded bounds
fn range_is_valid(lower: Bound<&Value>, upper: Bound<&Value>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l <= u,
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u)) => l < u,
        (Bound::Excluded(l), Bound::Excluded(u)) => l < u,
        _ => true,
    }
}

/// Lazily built indices for every column of one dataset instance
#[derive(Debug)]
pub struct DataSetIndex {
    dataset: Arc<DataSet>,
    columns: Vec<OnceLock<ColumnIndex>>,
    built: AtomicUsize,
}

impl DataSetIndex {
    pub fn new(dataset: Arc<DataSet>) -> Self {
        let columns = (0..dataset.column_count()).map(|_| OnceLock::new()).collect();
        Self {
            dataset,
            columns,
            built: AtomicUsize::new(0),
        }
    }

    pub fn dataset(&self) -> &Arc<DataSet> {
        &self.dataset
    }

    /// Index for the column at position `column`, building it if needed
    pub fn column(&self, column: usize) -> Option<&ColumnIndex> {
        let slot = self.columns.get(column)?;
        Some(slot.get_or_init(|| {
            let col = &self.dataset.columns()[column];
            let start = Instant::now();
            let idx = ColumnIndex::build(col.values());
            self.built.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                uuid = %self.dataset.uuid(),
                column = col.id(),
                distinct = idx.distinct_count(),
                ms = (start.elapsed().as_secs_f64() * 1000.0),
                "built column index"
            );
            idx
        }))
    }

    /// Index for the column with id `id` (case-insensitive)
    pub fn column_by_id(&self, id: &str) -> Option<&ColumnIndex> {
        self.column(self.dataset.column_index(id)?)
    }

    /// Build every column index now
    pub fn build_all(&self) {
        for i in 0..self.columns.len() {
            let _ = self.column(i);
        }
    }

    /// Number of column indices built so far
    pub fn built_count(&self) -> usize {
        self.built.load(Ordering::Relaxed)
    }

    pub fn is_built(&self, column: usize) -> bool {
        self.columns.get(column).is_some_and(|c| c.get().is_some())
    }
}
