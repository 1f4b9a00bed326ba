//! Sort engine
//!
//! Multi-criteria stable sort over row positions. Criteria apply in order;
//! rows that tie on every criterion keep their input order, so sorting
//! already-sorted rows is a no-op. Nulls go first (or last, per
//! [`NullOrdering`]) in both directions.

use crate::error::{QueryError, Result};
use crate::lookup::{SortCriterion, SortOrder};
use crate::options::NullOrdering;
use std::cmp::Ordering;
use tabula_db_core::{Column, DataSet, Value};

/// A criterion resolved against a dataset
struct SortKey<'a> {
    column: &'a Column,
    order: SortOrder,
}

/// Compare two cells under one criterion
pub fn compare_values(a: &Value, b: &Value, order: SortOrder, nulls: NullOrdering) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => match nulls {
            NullOrdering::First => Ordering::Less,
            NullOrdering::Last => Ordering::Greater,
        },
        (false, true) => match nulls {
            NullOrdering::First => Ordering::Greater,
            NullOrdering::Last => Ordering::Less,
        },
        (false, false) => match order {
            SortOrder::Asc => a.cmp(b),
            SortOrder::Desc => b.cmp(a),
        },
    }
}

/// Order `rows` of `dataset` by `criteria`
pub fn sort_rows(
    dataset: &DataSet,
    mut rows: Vec<usize>,
    criteria: &[SortCriterion],
    nulls: NullOrdering,
) -> Result<Vec<usize>> {
    if criteria.is_empty() {
        return Ok(rows);
    }
    let keys = criteria
        .iter()
        .map(|c| {
            dataset
                .column(&c.column_id)
                .map(|column| SortKey {
                    column,
                    order: c.order,
                })
                .ok_or_else(|| QueryError::unknown_column(&c.column_id))
        })
        .collect::<Result<Vec<_>>>()?;

    // sort_by is stable: full ties keep input order
    rows.sort_by(|&a, &b| {
        for key in &keys {
            let ord = compare_values(key.column.get(a), key.column.get(b), key.order, nulls);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_db_core::DataSetBuilder;

    fn dataset() -> DataSet {
        DataSetBuilder::new("ds")
            .label("dept")
            .number("amount")
            .row(vec!["Eng".into(), 300.into()])
            .row(vec!["Eng".into(), 100.into()])
            .row(vec!["Sales".into(), Value::Null])
            .row(vec!["Sales".into(), 50.into()])
            .row(vec!["Eng".into(), 100.into()])
            .build()
            .unwrap()
    }

    #[test]
    fn test_nulls_first_both_directions() {
        let ds = dataset();
        let asc = sort_rows(&ds, vec![0, 1, 2, 3, 4], &[SortCriterion::asc("amount")], NullOrdering::First).unwrap();
        assert_eq!(asc, vec![2, 3, 1, 4, 0]);
        let desc = sort_rows(&ds, vec![0, 1, 2, 3, 4], &[SortCriterion::desc("amount")], NullOrdering::First).unwrap();
        assert_eq!(desc, vec![2, 0, 1, 4, 3]);
    }

    #[test]
    fn test_nulls_last() {
        let ds = dataset();
        let asc = sort_rows(&ds, vec![0, 1, 2, 3, 4], &[SortCriterion::asc("amount")], NullOrdering::Last).unwrap();
        assert_eq!(asc, vec![3, 1, 4, 0, 2]);
    }

    #[test]
    fn test_tie_breaks_and_stability() {
        let ds = dataset();
        let criteria = [SortCriterion::desc("dept"), SortCriterion::asc("amount")];
        let sorted = sort_rows(&ds, vec![4, 3, 2, 1, 0], &criteria, NullOrdering::First).unwrap();
        // Sales first; Eng rows 4 and 1 tie and keep input order
        assert_eq!(sorted, vec![2, 3, 4, 1, 0]);
        let again = sort_rows(&ds, sorted.clone(), &criteria, NullOrdering::First).unwrap();
        assert_eq!(again, sorted);
    }

    #[test]
    fn test_unknown_sort_column() {
        let ds = dataset();
        let err = sort_rows(&ds, vec![0], &[SortCriterion::asc("nope")], NullOrdering::First).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
    }
}
