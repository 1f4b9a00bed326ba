//! Interval builders: per-column bucket key derivation
//!
//! The builder for a grouping column is chosen by matching on
//! `(ColumnType, GroupStrategy)`:
//!
//! | column | strategy | builder |
//! |--------|----------|---------|
//! | DATE   | FIXED    | [`FixedDateBuilder`]: canonical calendar buckets |
//! | DATE   | DYNAMIC  | [`DynamicDateBuilder`]: buckets spanning the observed range |
//! | other  | any      | raw value, one bucket per distinct value |
//!
//! A builder is resolved once per grouping column against every input row,
//! then used to partition each existing bucket, so dynamic interval sizes
//! and ranges agree across sub-partitions.

use crate::calendar::{self, DateIntervalType, DAY_NAMES, MONTH_NAMES};
use crate::error::{QueryError, Result};
use crate::lookup::{ColumnGroup, GroupStrategy};
use chrono::{Datelike, Month, NaiveDateTime, Timelike, Weekday};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tabula_db_core::{Column, ColumnType, Value};

/// Rows sharing one key of a single grouping column
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub key: Value,
    pub rows: Vec<usize>,
}

/// Resolved bucket-key derivation for one grouping column
#[derive(Debug, Clone)]
pub enum IntervalBuilder {
    Raw,
    FixedDate(FixedDateBuilder),
    DynamicDate(DynamicDateBuilder),
}

impl IntervalBuilder {
    /// Pick and configure the builder for `group` over `rows` of `column`
    pub fn resolve(column: &Column, group: &ColumnGroup, rows: &[usize]) -> Result<Self> {
        match (column.column_type(), group.strategy) {
            (ColumnType::Date, GroupStrategy::Fixed) => {
                FixedDateBuilder::new(column, group).map(IntervalBuilder::FixedDate)
            }
            (ColumnType::Date, GroupStrategy::Dynamic) => {
                DynamicDateBuilder::new(column, group, rows).map(IntervalBuilder::DynamicDate)
            }
            (_, _) => Ok(IntervalBuilder::Raw),
        }
    }

    /// Type of the emitted key column
    pub fn key_type(&self, column: &Column) -> ColumnType {
        match self {
            IntervalBuilder::Raw => column.column_type(),
            IntervalBuilder::FixedDate(_) | IntervalBuilder::DynamicDate(_) => ColumnType::Label,
        }
    }

    /// Split `rows` into intervals in emission order.
    ///
    /// Row order inside each interval follows `rows`.
    pub fn partition(&self, column: &Column, rows: &[usize]) -> Vec<Interval> {
        match self {
            IntervalBuilder::Raw => partition_raw(column, rows),
            IntervalBuilder::FixedDate(b) => b.partition(column, rows),
            IntervalBuilder::DynamicDate(b) => b.partition(column, rows),
        }
    }
}

/// One bucket per distinct value, in first-seen order
fn partition_raw(column: &Column, rows: &[usize]) -> Vec<Interval> {
    let mut slots: FxHashMap<&Value, usize> = FxHashMap::default();
    let mut out: Vec<Interval> = Vec::new();
    for &row in rows {
        let v = column.get(row);
        let slot = *slots.entry(v).or_insert_with(|| {
            out.push(Interval {
                key: v.clone(),
                rows: Vec::new(),
            });
            out.len() - 1
        });
        out[slot].rows.push(row);
    }
    out
}

/// Rows whose date is null end up in a trailing null bucket
fn push_null_bucket(out: &mut Vec<Interval>, nulls: Vec<usize>) {
    if !nulls.is_empty() {
        out.push(Interval {
            key: Value::Null,
            rows: nulls,
        });
    }
}

/// Canonical calendar buckets (months of the year, days of the week, ...)
#[derive(Debug, Clone)]
pub struct FixedDateBuilder {
    unit: DateIntervalType,
    first_month: Month,
    first_day: Weekday,
    ascending: bool,
    empty_intervals: bool,
}

impl FixedDateBuilder {
    fn new(column: &Column, group: &ColumnGroup) -> Result<Self> {
        let unit = group.interval_type.ok_or_else(|| {
            QueryError::invalid_request(format!(
                "FIXED grouping on '{}' requires an interval type",
                column.id()
            ))
        })?;
        match unit {
            DateIntervalType::Second
            | DateIntervalType::Minute
            | DateIntervalType::Hour
            | DateIntervalType::DayOfWeek
            | DateIntervalType::Month
            | DateIntervalType::Quarter => {}
            other => {
                return Err(QueryError::invalid_request(format!(
                    "FIXED grouping does not support {} intervals",
                    other
                )))
            }
        }
        Ok(Self {
            unit,
            first_month: group.first_month_of_year,
            first_day: group.first_day_of_week,
            ascending: group.ascending,
            empty_intervals: group.empty_intervals,
        })
    }

    fn bucket_count(&self) -> usize {
        match self.unit {
            DateIntervalType::Second | DateIntervalType::Minute => 60,
            DateIntervalType::Hour => 24,
            DateIntervalType::DayOfWeek => 7,
            DateIntervalType::Month => 12,
            _ => 4,
        }
    }

    /// Position of `dt` in calendar order (after rotation)
    fn position(&self, dt: NaiveDateTime) -> usize {
        let first_month0 = self.first_month.number_from_month() - 1;
        let pos = match self.unit {
            DateIntervalType::Second => dt.second(),
            DateIntervalType::Minute => dt.minute(),
            DateIntervalType::Hour => dt.hour(),
            DateIntervalType::DayOfWeek => {
                (dt.weekday().num_days_from_monday() + 7 - self.first_day.num_days_from_monday()) % 7
            }
            DateIntervalType::Month => (dt.month0() + 12 - first_month0) % 12,
            _ => ((dt.month0() + 12 - first_month0) % 12) / 3,
        };
        pos as usize
    }

    fn label(&self, pos: usize) -> String {
        match self.unit {
            DateIntervalType::DayOfWeek => {
                let first = self.first_day.num_days_from_monday() as usize;
                DAY_NAMES[(pos + first) % 7].to_string()
            }
            DateIntervalType::Month => {
                let first = self.first_month.number_from_month() as usize - 1;
                MONTH_NAMES[(pos + first) % 12].to_string()
            }
            DateIntervalType::Quarter => format!("Q{}", pos + 1),
            _ => pos.to_string(),
        }
    }

    fn partition(&self, column: &Column, rows: &[usize]) -> Vec<Interval> {
        let mut slots: Vec<Vec<usize>> = vec![Vec::new(); self.bucket_count()];
        let mut nulls = Vec::new();
        for &row in rows {
            match column.get(row).as_date() {
                Some(dt) => slots[self.position(dt)].push(row),
                None => nulls.push(row),
            }
        }
        let mut order: Vec<usize> = (0..slots.len()).collect();
        if !self.ascending {
            order.reverse();
        }
        let mut out: Vec<Interval> = order
            .into_iter()
            .filter_map(|pos| {
                let rows = std::mem::take(&mut slots[pos]);
                (self.empty_intervals || !rows.is_empty()).then(|| Interval {
                    key: Value::text(self.label(pos)),
                    rows,
                })
            })
            .collect();
        push_null_bucket(&mut out, nulls);
        out
    }
}

/// Buckets of one interval size spanning the observed date range
#[derive(Debug, Clone)]
pub struct DynamicDateBuilder {
    unit: DateIntervalType,
    week_start: Weekday,
    /// First and last bucket starts over the resolved rows
    span: Option<(NaiveDateTime, NaiveDateTime)>,
    ascending: bool,
    empty_intervals: bool,
}

impl DynamicDateBuilder {
    fn new(column: &Column, group: &ColumnGroup, rows: &[usize]) -> Result<Self> {
        if group.interval_type == Some(DateIntervalType::DayOfWeek) {
            return Err(QueryError::invalid_request(
                "DAY_OF_WEEK intervals require FIXED grouping",
            ));
        }
        let (min, max) = rows
            .iter()
            .filter_map(|&r| column.get(r).as_date())
            .fold(None, |acc: Option<(NaiveDateTime, NaiveDateTime)>, d| match acc {
                None => Some((d, d)),
                Some((lo, hi)) => Some((lo.min(d), hi.max(d))),
            })
            .map_or((None, None), |(lo, hi)| (Some(lo), Some(hi)));

        let week_start = group.first_day_of_week;
        // An explicit size is the smallest one allowed, never a bucket count override
        let unit = match (min, max) {
            (Some(lo), Some(hi)) => {
                fit_interval(lo, hi, group.interval_type, group.max_intervals, week_start)
            }
            _ => group.interval_type.unwrap_or(DateIntervalType::Year),
        };
        let span = match (min, max) {
            (Some(lo), Some(hi)) => calendar::truncate(lo, unit, week_start)
                .zip(calendar::truncate(hi, unit, week_start)),
            _ => None,
        };
        Ok(Self {
            unit,
            week_start,
            span,
            ascending: group.ascending,
            empty_intervals: group.empty_intervals,
        })
    }

    pub fn unit(&self) -> DateIntervalType {
        self.unit
    }

    fn partition(&self, column: &Column, rows: &[usize]) -> Vec<Interval> {
        let mut buckets: BTreeMap<NaiveDateTime, Vec<usize>> = BTreeMap::new();
        let mut nulls = Vec::new();
        for &row in rows {
            match column
                .get(row)
                .as_date()
                .and_then(|d| calendar::truncate(d, self.unit, self.week_start))
            {
                Some(start) => buckets.entry(start).or_default().push(row),
                None => nulls.push(row),
            }
        }
        if self.empty_intervals {
            if let Some((first, last)) = self.span {
                let mut cursor = Some(first);
                while let Some(start) = cursor.filter(|s| *s <= last) {
                    buckets.entry(start).or_default();
                    cursor = calendar::add(start, self.unit, 1);
                }
            }
        }
        let mut out: Vec<Interval> = buckets
            .into_iter()
            .map(|(start, rows)| Interval {
                key: Value::text(calendar::dynamic_label(start, self.unit)),
                rows,
            })
            .collect();
        if !self.ascending {
            out.reverse();
        }
        push_null_bucket(&mut out, nulls);
        out
    }
}

/// Smallest interval size, no finer than `smallest`, whose buckets over
/// `[min, max]` fit in `max_intervals`
fn fit_interval(
    min: NaiveDateTime,
    max: NaiveDateTime,
    smallest: Option<DateIntervalType>,
    max_intervals: usize,
    week_start: Weekday,
) -> DateIntervalType {
    let limit = max_intervals.max(1);
    let skip = smallest
        .and_then(|unit| DateIntervalType::DYNAMIC_SIZES.iter().position(|u| *u == unit))
        .unwrap_or(0);
    for unit in DateIntervalType::DYNAMIC_SIZES.into_iter().skip(skip) {
        if span_bucket_count(min, max, unit, week_start, limit) <= limit {
            return unit;
        }
    }
    DateIntervalType::Millennium
}

/// Buckets of `unit` spanning `[min, max]`, counting no further than `limit + 1`
fn span_bucket_count(
    min: NaiveDateTime,
    max: NaiveDateTime,
    unit: DateIntervalType,
    week_start: Weekday,
    limit: usize,
) -> usize {
    let Some(mut cursor) = calendar::truncate(min, unit, week_start) else {
        return usize::MAX;
    };
    let mut count = 0;
    while cursor <= max && count <= limit {
        count += 1;
        match calendar::add(cursor, unit, 1) {
            Some(next) => cursor = next,
            None => break,
        }
    }
    count
}
