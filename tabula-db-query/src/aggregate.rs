//! Aggregate functions over the member rows of a bucket
//!
//! Nulls are skipped by every function except COUNT, which counts rows.
//! An empty (or all-null) input yields the function's neutral value:
//! 0 for SUM / COUNT / DISTINCT, null for AVERAGE / MIN / MAX / MEDIAN and
//! the empty string for the JOIN family.
//!
//! # Type Handling
//!
//! - SUM, AVERAGE, MEDIAN require a NUMBER column
//! - MIN, MAX accept NUMBER or DATE and keep the source type
//! - COUNT, DISTINCT and JOIN accept any column

use crate::error::{QueryError, Result};
use crate::lookup::AggregateFunction;
use rustc_hash::FxHashSet;
use tabula_db_core::{Column, ColumnType, Value};

/// Check `function` against the source column and return the result type
pub fn result_type(function: AggregateFunction, column: &Column) -> Result<ColumnType> {
    let source = column.column_type();
    let incompatible = || {
        QueryError::type_error(format!(
            "{} cannot be applied to {} column '{}'",
            function.name(),
            source,
            column.id()
        ))
    };
    match function {
        AggregateFunction::Count | AggregateFunction::Distinct => Ok(ColumnType::Number),
        AggregateFunction::Sum | AggregateFunction::Average | AggregateFunction::Median => {
            if source == ColumnType::Number {
                Ok(ColumnType::Number)
            } else {
                Err(incompatible())
            }
        }
        AggregateFunction::Min | AggregateFunction::Max => match source {
            ColumnType::Number | ColumnType::Date => Ok(source),
            _ => Err(incompatible()),
        },
        AggregateFunction::Join | AggregateFunction::JoinComma | AggregateFunction::JoinHyphen => {
            Ok(ColumnType::Text)
        }
    }
}

/// Evaluate `function` over `rows` of `column`.
///
/// Callers validate the pairing with [`result_type`] first.
pub fn aggregate(function: AggregateFunction, column: &Column, rows: &[usize]) -> Value {
    let non_null = || rows.iter().map(|&r| column.get(r)).filter(|v| !v.is_null());
    let numbers = || non_null().filter_map(Value::as_number);

    match function {
        AggregateFunction::Count => Value::Number(rows.len() as f64),
        AggregateFunction::Distinct => {
            let distinct: FxHashSet<&Value> = non_null().collect();
            Value::Number(distinct.len() as f64)
        }
        AggregateFunction::Sum => Value::Number(numbers().sum()),
        AggregateFunction::Average => {
            let (sum, n) = numbers().fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
            if n == 0 {
                Value::Null
            } else {
                Value::Number(sum / n as f64)
            }
        }
        AggregateFunction::Min => non_null().min().cloned().unwrap_or(Value::Null),
        AggregateFunction::Max => non_null().max().cloned().unwrap_or(Value::Null),
        AggregateFunction::Median => {
            let mut values: Vec<f64> = numbers().collect();
            median(&mut values).map(Value::Number).unwrap_or(Value::Null)
        }
        AggregateFunction::Join | AggregateFunction::JoinComma | AggregateFunction::JoinHyphen => {
            let separator = function.separator().unwrap_or(" | ");
            let parts: Vec<String> = non_null().map(Value::to_string).collect();
            Value::text(parts.join(separator))
        }
    }
}

/// Middle value; the mean of the two middle values for even counts
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_db_core::parse_date;

    fn numbers(values: Vec<Value>) -> Column {
        Column::new("amount", ColumnType::Number, values).unwrap()
    }

    fn rows(col: &Column) -> Vec<usize> {
        (0..col.len()).collect()
    }

    #[test]
    fn test_numeric_aggregates_skip_nulls() {
        let col = numbers(vec![4.into(), Value::Null, 1.into(), 3.into(), 1.into()]);
        let r = rows(&col);
        assert_eq!(aggregate(AggregateFunction::Count, &col, &r), Value::number(5));
        assert_eq!(aggregate(AggregateFunction::Distinct, &col, &r), Value::number(3));
        assert_eq!(aggregate(AggregateFunction::Sum, &col, &r), Value::number(9));
        assert_eq!(aggregate(AggregateFunction::Average, &col, &r), Value::number(2.25));
        assert_eq!(aggregate(AggregateFunction::Min, &col, &r), Value::number(1));
        assert_eq!(aggregate(AggregateFunction::Max, &col, &r), Value::number(4));
        assert_eq!(aggregate(AggregateFunction::Median, &col, &r), Value::number(2));
    }

    #[test]
    fn test_neutral_values_on_all_null() {
        let col = numbers(vec![Value::Null, Value::Null]);
        let r = rows(&col);
        assert_eq!(aggregate(AggregateFunction::Count, &col, &r), Value::number(2));
        assert_eq!(aggregate(AggregateFunction::Sum, &col, &r), Value::number(0));
        assert_eq!(aggregate(AggregateFunction::Distinct, &col, &r), Value::number(0));
        for f in [
            AggregateFunction::Average,
            AggregateFunction::Min,
            AggregateFunction::Max,
            AggregateFunction::Median,
        ] {
            assert_eq!(aggregate(f, &col, &r), Value::Null);
        }
        assert_eq!(aggregate(AggregateFunction::Join, &col, &r), Value::text(""));
        assert_eq!(aggregate(AggregateFunction::Count, &col, &[]), Value::number(0));
    }

    #[test]
    fn test_join_in_row_order() {
        let col = Column::new(
            "city",
            ColumnType::Label,
            vec!["BCN".into(), Value::Null, "MAD".into(), "BCN".into()],
        )
        .unwrap();
        let r = vec![3, 0, 1, 2];
        assert_eq!(
            aggregate(AggregateFunction::JoinComma, &col, &r),
            Value::text("BCN, BCN, MAD")
        );
        assert_eq!(
            aggregate(AggregateFunction::JoinHyphen, &col, &[0, 2]),
            Value::text("BCN - MAD")
        );
        let nums = numbers(vec![1.into(), 2.5.into()]);
        assert_eq!(aggregate(AggregateFunction::Join, &nums, &[0, 1]), Value::text("1 | 2.5"));
    }

    #[test]
    fn test_min_max_on_dates() {
        let col = Column::new(
            "date",
            ColumnType::Date,
            vec![parse_date("2020-05-01").into(), parse_date("2019-01-01").into()],
        )
        .unwrap();
        assert_eq!(result_type(AggregateFunction::Min, &col), Ok(ColumnType::Date));
        assert_eq!(
            aggregate(AggregateFunction::Min, &col, &[0, 1]),
            Value::from(parse_date("2019-01-01"))
        );
    }

    #[test]
    fn test_type_errors() {
        let col = Column::new("dept", ColumnType::Label, vec![]).unwrap();
        for f in [
            AggregateFunction::Sum,
            AggregateFunction::Average,
            AggregateFunction::Median,
            AggregateFunction::Max,
        ] {
            assert!(matches!(result_type(f, &col), Err(QueryError::TypeError(_))));
        }
        assert_eq!(result_type(AggregateFunction::Count, &col), Ok(ColumnType::Number));
    }
}
