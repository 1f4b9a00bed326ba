//! Group engine
//!
//! Partitions rows column-by-column: the first grouping column splits the
//! input into intervals, each further column sub-partitions every bucket.
//! A bucket's key is the tuple of per-column interval keys, in grouping
//! column order. With no grouping columns there is exactly one bucket
//! holding every input row, even when there are none.

use crate::aggregate::{aggregate, result_type};
use crate::error::{QueryError, Result};
use crate::interval::IntervalBuilder;
use crate::lookup::{AggregateColumn, GroupOp};
use rustc_hash::FxHashSet;
use tabula_db_core::{Column, ColumnType, DataSet, RowSet, Value};

/// One emitted group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBucket {
    pub key: Vec<Value>,
    pub rows: Vec<usize>,
    /// One value per aggregate column, in declaration order
    pub aggregates: Vec<Value>,
}

/// Group output: buckets plus the schema of the table they form
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub buckets: Vec<GroupBucket>,
    key_columns: Vec<(String, ColumnType)>,
    agg_columns: Vec<(String, ColumnType)>,
}

fn resolve_column<'a>(dataset: &'a DataSet, id: &str) -> Result<&'a Column> {
    dataset.column(id).ok_or_else(|| QueryError::unknown_column(id))
}

fn resolve_aggregates<'a>(
    dataset: &'a DataSet,
    specs: &'a [AggregateColumn],
) -> Result<Vec<(&'a AggregateColumn, &'a Column, ColumnType)>> {
    specs
        .iter()
        .map(|spec| {
            let column = resolve_column(dataset, &spec.source_column_id)?;
            let ty = result_type(spec.function, column)?;
            Ok((spec, column, ty))
        })
        .collect()
}

/// Rows of `rows` that belong to the op's selected intervals.
///
/// Selection is made on the first grouping column; the result keeps
/// ascending row order.
pub fn select_intervals(dataset: &DataSet, rows: &[usize], op: &GroupOp) -> Result<Vec<usize>> {
    if op.selected_intervals.is_empty() {
        return Ok(rows.to_vec());
    }
    let group = op.group_columns.first().ok_or_else(|| {
        QueryError::invalid_request("interval selection requires a grouping column")
    })?;
    let column = resolve_column(dataset, &group.column_id)?;
    let builder = IntervalBuilder::resolve(column, group, rows)?;
    let wanted: FxHashSet<&str> = op.selected_intervals.iter().map(String::as_str).collect();
    let kept = builder
        .partition(column, rows)
        .into_iter()
        .filter(|interval| wanted.contains(interval.key.to_string().as_str()))
        .flat_map(|interval| interval.rows)
        .collect::<Vec<_>>();
    Ok(RowSet::from_unsorted(kept).into_vec())
}

/// Bucket `rows` by the op's grouping columns and aggregate each bucket
pub fn group(dataset: &DataSet, rows: &[usize], op: &GroupOp) -> Result<GroupResult> {
    let aggregates = resolve_aggregates(dataset, &op.agg_columns)?;
    let rows = select_intervals(dataset, rows, op)?;

    let mut buckets = vec![GroupBucket {
        key: Vec::new(),
        rows,
        aggregates: Vec::new(),
    }];
    let mut key_columns = Vec::with_capacity(op.group_columns.len());

    for group in &op.group_columns {
        let column = resolve_column(dataset, &group.column_id)?;
        let all_rows: Vec<usize> = buckets.iter().flat_map(|b| b.rows.iter().copied()).collect();
        let builder = IntervalBuilder::resolve(column, group, &all_rows)?;
        key_columns.push((group.result_id().to_string(), builder.key_type(column)));
        buckets = split_buckets(buckets, column, &builder);
    }

    for bucket in &mut buckets {
        bucket.aggregates = aggregates
            .iter()
            .map(|(spec, column, _)| aggregate(spec.function, column, &bucket.rows))
            .collect();
    }

    Ok(GroupResult {
        buckets,
        key_columns,
        agg_columns: aggregates
            .iter()
            .map(|(spec, _, ty)| (spec.result_column_id.clone(), *ty))
            .collect(),
    })
}

fn split_buckets(
    buckets: Vec<GroupBucket>,
    column: &Column,
    builder: &IntervalBuilder,
) -> Vec<GroupBucket> {
    let mut out = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        for interval in builder.partition(column, &bucket.rows) {
            let mut key = bucket.key.clone();
            key.push(interval.key);
            out.push(GroupBucket {
                key,
                rows: interval.rows,
                aggregates: Vec::new(),
            });
        }
    }
    out
}

impl GroupResult {
    /// Total member rows across all buckets
    pub fn member_count(&self) -> usize {
        self.buckets.iter().map(|b| b.rows.len()).sum()
    }

    /// Table of one row per bucket: key columns, then aggregate columns
    pub fn to_dataset(&self, uuid: &str) -> Result<DataSet> {
        let mut columns = Vec::with_capacity(self.key_columns.len() + self.agg_columns.len());
        for (i, (id, ty)) in self.key_columns.iter().enumerate() {
            let values = self.buckets.iter().map(|b| b.key[i].clone()).collect();
            columns.push(Column::new(id.clone(), *ty, values)?);
        }
        for (i, (id, ty)) in self.agg_columns.iter().enumerate() {
            let values = self.buckets.iter().map(|b| b.aggregates[i].clone()).collect();
            columns.push(Column::new(id.clone(), *ty, values)?);
        }
        DataSet::new(uuid, columns).map_err(|e| match e {
            tabula_db_core::CoreError::DuplicateColumn(id) => {
                QueryError::invalid_request(format!("Duplicate result column: {}", id))
            }
            other => other.into(),
        })
    }
}
