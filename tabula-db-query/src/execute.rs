//! Lookup pipeline: Filter → Group → Sort → Select
//!
//! Group operations that only carry `selected_intervals` act as row
//! filters and may appear anywhere; at most one group operation produces a
//! grouped table and it must be the last one. Sort criteria then address
//! the columns of whatever table the group stage produced.

use crate::error::{QueryError, Result};
use crate::filter::apply_filter;
use crate::groupby::{group, select_intervals};
use crate::lookup::{DataSetLookup, GroupOp};
use crate::options::QueryOptions;
use crate::project::select_columns;
use crate::sort::sort_rows;
use std::time::Instant;
use tabula_db_core::{DataSet, DataSetIndex, RowSet};

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Split group ops into row-narrowing selections and the final aggregating op
fn plan_group_ops(ops: &[GroupOp]) -> Result<(Vec<&GroupOp>, Option<&GroupOp>)> {
    let active: Vec<&GroupOp> = ops.iter().filter(|op| !op.is_noop()).collect();
    let mut selections = Vec::new();
    let mut grouping = None;
    for (i, op) in active.iter().enumerate() {
        if op.is_selection_only() {
            selections.push(*op);
        } else if i + 1 == active.len() {
            grouping = Some(*op);
        } else {
            return Err(QueryError::invalid_request(
                "only the last group operation may produce a grouped result",
            ));
        }
    }
    Ok((selections, grouping))
}

/// Run `lookup` against one dataset instance.
///
/// `index` must belong to `dataset`; it is consulted only when
/// `options.use_indices` is set.
pub fn execute(
    dataset: &DataSet,
    index: Option<&DataSetIndex>,
    lookup: &DataSetLookup,
    options: &QueryOptions,
) -> Result<DataSet> {
    let (selections, grouping) = plan_group_ops(&lookup.group_ops)?;

    // Filter
    let rows = {
        let span = tracing::debug_span!(
            "lookup_filter",
            rows_in = dataset.row_count(),
            rows_out = tracing::field::Empty,
            ms = tracing::field::Empty,
        );
        let _guard = span.enter();
        let start = Instant::now();
        let rows = apply_filter(
            dataset,
            index,
            lookup.filter.as_ref(),
            RowSet::all(dataset.row_count()),
            options,
        )?;
        span.record("rows_out", rows.len());
        span.record("ms", elapsed_ms(start));
        rows
    };

    // Group
    let (table, rows) = {
        let span = tracing::debug_span!(
            "lookup_group",
            rows_in = rows.len(),
            selections = selections.len(),
            grouped = grouping.is_some(),
            buckets = tracing::field::Empty,
            ms = tracing::field::Empty,
        );
        let _guard = span.enter();
        let start = Instant::now();
        let mut rows = rows.into_vec();
        for op in &selections {
            rows = select_intervals(dataset, &rows, op)?;
        }
        let out = match grouping {
            Some(op) => {
                let result = group(dataset, &rows, op)?;
                let table = result.to_dataset(dataset.uuid())?;
                span.record("buckets", result.buckets.len());
                let n = table.row_count();
                (std::borrow::Cow::Owned(table), (0..n).collect::<Vec<usize>>())
            }
            None => (std::borrow::Cow::Borrowed(dataset), rows),
        };
        span.record("ms", elapsed_ms(start));
        out
    };

    // Sort
    let rows = {
        let span = tracing::debug_span!(
            "lookup_sort",
            rows = rows.len(),
            criteria = lookup.sort_ops.len(),
            ms = tracing::field::Empty,
        );
        let _guard = span.enter();
        let start = Instant::now();
        let sorted = sort_rows(&table, rows, &lookup.sort_ops, options.null_ordering)?;
        span.record("ms", elapsed_ms(start));
        sorted
    };

    // Select
    let span = tracing::debug_span!(
        "lookup_select",
        columns = tracing::field::Empty,
        rows_out = tracing::field::Empty,
    );
    let _guard = span.enter();
    let result = select_columns(table.take_rows(&rows), lookup.selected_columns.as_deref())?;
    let result = if lookup.row_offset > 0 || lookup.row_count.is_some() {
        result.slice(lookup.row_offset, lookup.row_count)
    } else {
        result
    };
    span.record("columns", result.column_count());
    span.record("rows_out", result.row_count());
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{AggregateFunction, ColumnGroup, FilterNode, SortCriterion};
    use std::sync::Arc;
    use tabula_db_core::{DataSetBuilder, Value};

    fn dataset() -> DataSet {
        DataSetBuilder::new("expenses")
            .label("department")
            .number("amount")
            .label("city")
            .row(vec!["Eng".into(), 100.into(), "BCN".into()])
            .row(vec!["Eng".into(), 200.into(), "BCN".into()])
            .row(vec!["Sales".into(), 50.into(), "MAD".into()])
            .row(vec!["Eng".into(), 300.into(), "MAD".into()])
            .build()
            .unwrap()
    }

    #[test]
    fn test_group_then_sort_on_result_columns() {
        let ds = dataset();
        let lookup = DataSetLookup::new("expenses")
            .group(
                GroupOp::new()
                    .group_by(ColumnGroup::new("city"))
                    .aggregate("amount", AggregateFunction::Sum, "total"),
            )
            .sort(SortCriterion::desc("total"));
        let out = execute(&ds, None, &lookup, &QueryOptions::default()).unwrap();
        assert_eq!(out.row(0), vec!["MAD".into(), 350.into()]);
        assert_eq!(out.row(1), vec!["BCN".into(), 300.into()]);
    }

    #[test]
    fn test_window_after_projection() {
        let ds = dataset();
        let index = DataSetIndex::new(Arc::new(ds.clone()));
        let lookup = DataSetLookup::new("expenses")
            .sort(SortCriterion::asc("amount"))
            .select(["amount"])
            .window(1, Some(2));
        let out = execute(&ds, Some(&index), &lookup, &QueryOptions::default()).unwrap();
        assert_eq!(out.column_count(), 1);
        assert_eq!(out.columns()[0].values(), &[Value::number(100), Value::number(200)]);
    }

    #[test]
    fn test_only_last_group_op_may_aggregate() {
        let ds = dataset();
        let agg = GroupOp::new()
            .group_by(ColumnGroup::new("city"))
            .aggregate("amount", AggregateFunction::Count, "n");
        let lookup = DataSetLookup::new("expenses").group(agg.clone()).group(agg);
        let err = execute(&ds, None, &lookup, &QueryOptions::default()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
    }

    #[test]
    fn test_drill_down_then_group() {
        let ds = dataset();
        let lookup = DataSetLookup::new("expenses")
            .group(GroupOp::new().group_by(ColumnGroup::new("city")).select_interval("MAD"))
            .group(
                GroupOp::new()
                    .group_by(ColumnGroup::new("department"))
                    .aggregate("amount", AggregateFunction::Sum, "total"),
            );
        let out = execute(&ds, None, &lookup, &QueryOptions::default()).unwrap();
        assert_eq!(out.row(0), vec!["Sales".into(), 50.into()]);
        assert_eq!(out.row(1), vec!["Eng".into(), 300.into()]);
    }

    #[test]
    fn test_errors_abort_lookup() {
        let ds = dataset();
        let lookup = DataSetLookup::new("expenses").filter(FilterNode::equals_to("nope", 1));
        assert!(execute(&ds, None, &lookup, &QueryOptions::default()).is_err());
        let lookup = DataSetLookup::new("expenses").select(["missing"]);
        assert!(execute(&ds, None, &lookup, &QueryOptions::default()).is_err());
    }
}
