//! Lookup requests
//!
//! A [`DataSetLookup`] is a declarative query against one registered
//! dataset: an optional filter tree, a sequence of group operations, sort
//! criteria and an optional column selection. It is plain data; execution
//! lives in [`crate::execute`].

use crate::calendar::DateIntervalType;
use chrono::{Month, Weekday};
use serde::{Deserialize, Serialize};
use tabula_db_core::Value;

/// Leaf predicate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreFunction {
    EqualsTo,
    NotEqualsTo,
    GreaterThan,
    LowerThan,
    GreaterOrEqualsTo,
    LowerOrEqualsTo,
    Between,
    NotBetween,
    In,
    NotIn,
    /// SQL-style pattern: `%` any run of characters, `_` exactly one
    LikeTo,
    IsNull,
    NotNull,
    /// Relative date window such as `"last 7 day"`
    TimeFrame,
}

impl CoreFunction {
    /// Whether this function is the complement of a positive function
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            CoreFunction::NotEqualsTo
                | CoreFunction::NotBetween
                | CoreFunction::NotIn
                | CoreFunction::NotNull
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            CoreFunction::EqualsTo => "EQUALS_TO",
            CoreFunction::NotEqualsTo => "NOT_EQUALS_TO",
            CoreFunction::GreaterThan => "GREATER_THAN",
            CoreFunction::LowerThan => "LOWER_THAN",
            CoreFunction::GreaterOrEqualsTo => "GREATER_OR_EQUALS_TO",
            CoreFunction::LowerOrEqualsTo => "LOWER_OR_EQUALS_TO",
            CoreFunction::Between => "BETWEEN",
            CoreFunction::NotBetween => "NOT_BETWEEN",
            CoreFunction::In => "IN",
            CoreFunction::NotIn => "NOT_IN",
            CoreFunction::LikeTo => "LIKE_TO",
            CoreFunction::IsNull => "IS_NULL",
            CoreFunction::NotNull => "NOT_NULL",
            CoreFunction::TimeFrame => "TIME_FRAME",
        }
    }
}

/// Filter tree
///
/// `Not` negates the conjunction of its children, relative to the rows
/// still under consideration when it is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterNode {
    Predicate {
        column_id: String,
        function: CoreFunction,
        #[serde(default)]
        args: Vec<Value>,
    },
    And {
        children: Vec<FilterNode>,
    },
    Or {
        children: Vec<FilterNode>,
    },
    Not {
        children: Vec<FilterNode>,
    },
}

impl FilterNode {
    pub fn predicate(
        column_id: impl Into<String>,
        function: CoreFunction,
        args: Vec<Value>,
    ) -> Self {
        FilterNode::Predicate {
            column_id: column_id.into(),
            function,
            args,
        }
    }

    pub fn equals_to(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::EqualsTo, vec![value.into()])
    }

    pub fn not_equals_to(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::NotEqualsTo, vec![value.into()])
    }

    pub fn greater_than(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::GreaterThan, vec![value.into()])
    }

    pub fn lower_than(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::LowerThan, vec![value.into()])
    }

    pub fn greater_or_equals_to(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::GreaterOrEqualsTo, vec![value.into()])
    }

    pub fn lower_or_equals_to(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::LowerOrEqualsTo, vec![value.into()])
    }

    pub fn between(
        column_id: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::predicate(column_id, CoreFunction::Between, vec![low.into(), high.into()])
    }

    pub fn not_between(
        column_id: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::predicate(column_id, CoreFunction::NotBetween, vec![low.into(), high.into()])
    }

    pub fn is_in(column_id: impl Into<String>, values: Vec<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::In, values)
    }

    pub fn not_in(column_id: impl Into<String>, values: Vec<Value>) -> Self {
        Self::predicate(column_id, CoreFunction::NotIn, values)
    }

    pub fn like_to(column_id: impl Into<String>, pattern: &str) -> Self {
        Self::predicate(column_id, CoreFunction::LikeTo, vec![Value::text(pattern)])
    }

    pub fn is_null(column_id: impl Into<String>) -> Self {
        Self::predicate(column_id, CoreFunction::IsNull, Vec::new())
    }

    pub fn not_null(column_id: impl Into<String>) -> Self {
        Self::predicate(column_id, CoreFunction::NotNull, Vec::new())
    }

    pub fn time_frame(column_id: impl Into<String>, expr: &str) -> Self {
        Self::predicate(column_id, CoreFunction::TimeFrame, vec![Value::text(expr)])
    }

    pub fn and(children: Vec<FilterNode>) -> Self {
        FilterNode::And { children }
    }

    pub fn or(children: Vec<FilterNode>) -> Self {
        FilterNode::Or { children }
    }

    pub fn not(children: Vec<FilterNode>) -> Self {
        FilterNode::Not { children }
    }

    /// Whether the result depends on the current time
    pub fn is_time_dependent(&self) -> bool {
        match self {
            FilterNode::Predicate { function, .. } => *function == CoreFunction::TimeFrame,
            FilterNode::And { children }
            | FilterNode::Or { children }
            | FilterNode::Not { children } => children.iter().any(FilterNode::is_time_dependent),
        }
    }
}

/// How a grouping column derives bucket keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStrategy {
    /// Calendar buckets independent of the data range
    Fixed,
    /// Buckets spanning the observed min/max of the data
    #[default]
    Dynamic,
}

fn default_max_intervals() -> usize {
    15
}

fn default_true() -> bool {
    true
}

fn default_first_month() -> Month {
    Month::January
}

fn default_first_day() -> Weekday {
    Weekday::Mon
}

/// One grouping column of a [`GroupOp`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnGroup {
    pub column_id: String,
    /// Output column id; defaults to `column_id`
    #[serde(default)]
    pub result_column_id: Option<String>,
    #[serde(default)]
    pub strategy: GroupStrategy,
    /// Interval size for DATE columns; `None` lets DYNAMIC pick one
    #[serde(default)]
    pub interval_type: Option<DateIntervalType>,
    /// Upper bound on buckets when DYNAMIC picks the interval size
    #[serde(default = "default_max_intervals")]
    pub max_intervals: usize,
    /// Emit buckets that have no member rows
    #[serde(default)]
    pub empty_intervals: bool,
    #[serde(default = "default_true")]
    pub ascending: bool,
    #[serde(default = "default_first_month")]
    pub first_month_of_year: Month,
    #[serde(default = "default_first_day")]
    pub first_day_of_week: Weekday,
}

impl ColumnGroup {
    /// Raw-value grouping (one bucket per distinct value)
    pub fn new(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            result_column_id: None,
            strategy: GroupStrategy::Dynamic,
            interval_type: None,
            max_intervals: default_max_intervals(),
            empty_intervals: false,
            ascending: true,
            first_month_of_year: Month::January,
            first_day_of_week: Weekday::Mon,
        }
    }

    pub fn fixed(column_id: impl Into<String>, interval_type: DateIntervalType) -> Self {
        Self {
            strategy: GroupStrategy::Fixed,
            interval_type: Some(interval_type),
            ..Self::new(column_id)
        }
    }

    pub fn dynamic(column_id: impl Into<String>, interval_type: DateIntervalType) -> Self {
        Self {
            strategy: GroupStrategy::Dynamic,
            interval_type: Some(interval_type),
            ..Self::new(column_id)
        }
    }

    pub fn with_result_id(mut self, id: impl Into<String>) -> Self {
        self.result_column_id = Some(id.into());
        self
    }

    pub fn with_max_intervals(mut self, max: usize) -> Self {
        self.max_intervals = max;
        self
    }

    pub fn with_empty_intervals(mut self, emit: bool) -> Self {
        self.empty_intervals = emit;
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn with_first_month_of_year(mut self, month: Month) -> Self {
        self.first_month_of_year = month;
        self
    }

    pub fn with_first_day_of_week(mut self, day: Weekday) -> Self {
        self.first_day_of_week = day;
        self
    }

    pub fn result_id(&self) -> &str {
        self.result_column_id.as_deref().unwrap_or(&self.column_id)
    }
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateFunction {
    /// Rows in the bucket, nulls included
    Count,
    /// Unique non-null values
    Distinct,
    Sum,
    Average,
    Min,
    Max,
    Median,
    /// Stringified non-null values joined with `" | "`
    Join,
    /// Joined with `", "`
    JoinComma,
    /// Joined with `" - "`
    JoinHyphen,
}

impl AggregateFunction {
    /// Separator for the JOIN family
    pub fn separator(&self) -> Option<&'static str> {
        match self {
            AggregateFunction::Join => Some(" | "),
            AggregateFunction::JoinComma => Some(", "),
            AggregateFunction::JoinHyphen => Some(" - "),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Distinct => "DISTINCT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Average => "AVERAGE",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Median => "MEDIAN",
            AggregateFunction::Join => "JOIN",
            AggregateFunction::JoinComma => "JOIN_COMMA",
            AggregateFunction::JoinHyphen => "JOIN_HYPHEN",
        }
    }
}

/// Aggregate column of a [`GroupOp`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateColumn {
    pub source_column_id: String,
    pub function: AggregateFunction,
    pub result_column_id: String,
}

impl AggregateColumn {
    pub fn new(
        source_column_id: impl Into<String>,
        function: AggregateFunction,
        result_column_id: impl Into<String>,
    ) -> Self {
        Self {
            source_column_id: source_column_id.into(),
            function,
            result_column_id: result_column_id.into(),
        }
    }
}

/// A grouping step
///
/// With aggregate columns it produces one row per bucket. With only
/// `selected_intervals` it narrows the rows to the members of the named
/// buckets of its first grouping column and leaves them ungrouped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupOp {
    #[serde(default)]
    pub group_columns: Vec<ColumnGroup>,
    #[serde(default)]
    pub agg_columns: Vec<AggregateColumn>,
    #[serde(default)]
    pub selected_intervals: Vec<String>,
}

impl GroupOp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group_by(mut self, group: ColumnGroup) -> Self {
        self.group_columns.push(group);
        self
    }

    pub fn aggregate(
        mut self,
        source_column_id: impl Into<String>,
        function: AggregateFunction,
        result_column_id: impl Into<String>,
    ) -> Self {
        self.agg_columns
            .push(AggregateColumn::new(source_column_id, function, result_column_id));
        self
    }

    pub fn select_interval(mut self, name: impl Into<String>) -> Self {
        self.selected_intervals.push(name.into());
        self
    }

    /// Narrows rows without producing a grouped table
    pub fn is_selection_only(&self) -> bool {
        !self.selected_intervals.is_empty() && self.agg_columns.is_empty()
    }

    /// Does nothing at all
    pub fn is_noop(&self) -> bool {
        self.group_columns.is_empty()
            && self.agg_columns.is_empty()
            && self.selected_intervals.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortCriterion {
    pub column_id: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortCriterion {
    pub fn asc(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(column_id: impl Into<String>) -> Self {
        Self {
            column_id: column_id.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A query against one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSetLookup {
    pub dataset_uuid: String,
    #[serde(default)]
    pub filter: Option<FilterNode>,
    #[serde(default)]
    pub group_ops: Vec<GroupOp>,
    #[serde(default)]
    pub sort_ops: Vec<SortCriterion>,
    /// Output columns in the requested order; `None` keeps every column
    #[serde(default)]
    pub selected_columns: Option<Vec<String>>,
    /// Rows skipped from the final result
    #[serde(default)]
    pub row_offset: usize,
    /// Maximum rows returned; `None` is unbounded
    #[serde(default)]
    pub row_count: Option<usize>,
}

impl DataSetLookup {
    pub fn new(dataset_uuid: impl Into<String>) -> Self {
        Self {
            dataset_uuid: dataset_uuid.into(),
            filter: None,
            group_ops: Vec::new(),
            sort_ops: Vec::new(),
            selected_columns: None,
            row_offset: 0,
            row_count: None,
        }
    }

    /// Set the filter, AND-ing with any filter already present
    pub fn filter(mut self, node: FilterNode) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => FilterNode::and(vec![existing, node]),
            None => node,
        });
        self
    }

    pub fn group(mut self, op: GroupOp) -> Self {
        self.group_ops.push(op);
        self
    }

    pub fn sort(mut self, criterion: SortCriterion) -> Self {
        self.sort_ops.push(criterion);
        self
    }

    pub fn select<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.selected_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn window(mut self, offset: usize, count: Option<usize>) -> Self {
        self.row_offset = offset;
        self.row_count = count;
        self
    }

    /// Whether the result depends on the current time (TIME_FRAME)
    pub fn is_time_dependent(&self) -> bool {
        self.filter
            .as_ref()
            .is_some_and(FilterNode::is_time_dependent)
    }
}
