//! Filter engine
//!
//! A [`FilterNode`] tree is first compiled against the dataset: column ids
//! are resolved, arguments are checked against the column type, LIKE
//! patterns become regexes and time frames are resolved. Compilation
//! reports every structural problem as `InvalidRequest`; evaluation of a
//! compiled filter cannot fail.
//!
//! Evaluation narrows a candidate [`RowSet`]:
//! - `AND` feeds each child the rows left by the previous one
//! - `OR` unions the children, each evaluated on the same candidates
//! - `NOT` is the complement of the conjunction of its children, taken
//!   within the current candidates (never the whole dataset)
//!
//! Predicates that admit an index lookup (equality, ranges, set
//! membership, null tests) are resolved through the [`DataSetIndex`] when
//! one is supplied; the rest scan the candidate rows.

use crate::error::{QueryError, Result};
use crate::lookup::{CoreFunction, FilterNode};
use crate::options::QueryOptions;
use crate::timeframe::TimeFrame;
use regex::{Regex, RegexBuilder};
use std::ops::Bound;
use tabula_db_core::{parse_date, Column, ColumnType, DataSet, DataSetIndex, RowSet, Value};

/// Test applied to one cell; nulls fail every test but `IsNull`
#[derive(Debug)]
enum Matcher {
    Eq(Value),
    Gt(Value),
    Lt(Value),
    Ge(Value),
    Le(Value),
    Between(Value, Value),
    In(Vec<Value>),
    Like(Regex),
    IsNull,
}

impl Matcher {
    fn matches(&self, v: &Value) -> bool {
        if v.is_null() {
            return matches!(self, Matcher::IsNull);
        }
        match self {
            Matcher::Eq(a) => v == a,
            Matcher::Gt(a) => v > a,
            Matcher::Lt(a) => v < a,
            Matcher::Ge(a) => v >= a,
            Matcher::Le(a) => v <= a,
            Matcher::Between(lo, hi) => v >= lo && v <= hi,
            Matcher::In(set) => set.contains(v),
            Matcher::Like(re) => v.as_str().is_some_and(|s| re.is_match(s)),
            Matcher::IsNull => false,
        }
    }

    /// Rows matching through the column index, if this test admits one
    fn index_rows(&self, index: &tabula_db_core::ColumnIndex) -> Option<RowSet> {
        let rows = match self {
            Matcher::Eq(a) => index.rows_eq(a),
            Matcher::Gt(a) => index.rows_range(Bound::Excluded(a), Bound::Unbounded),
            Matcher::Lt(a) => index.rows_range(Bound::Unbounded, Bound::Excluded(a)),
            Matcher::Ge(a) => index.rows_range(Bound::Included(a), Bound::Unbounded),
            Matcher::Le(a) => index.rows_range(Bound::Unbounded, Bound::Included(a)),
            Matcher::Between(lo, hi) => index.rows_range(Bound::Included(lo), Bound::Included(hi)),
            Matcher::In(set) => index.rows_in(set),
            Matcher::IsNull => index.rows_null(),
            Matcher::Like(_) => return None,
        };
        Some(rows)
    }
}

#[derive(Debug)]
struct CompiledPredicate {
    column: usize,
    matcher: Matcher,
    negated: bool,
}

/// A filter tree resolved against one dataset
#[derive(Debug)]
pub struct CompiledFilter(Node);

#[derive(Debug)]
enum Node {
    Predicate(CompiledPredicate),
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Vec<Node>),
}

impl CompiledFilter {
    pub fn compile(dataset: &DataSet, node: &FilterNode, options: &QueryOptions) -> Result<Self> {
        compile_node(dataset, node, options).map(CompiledFilter)
    }

    /// Rows of `candidates` that pass the filter
    pub fn apply(&self, dataset: &DataSet, index: Option<&DataSetIndex>, candidates: &RowSet) -> RowSet {
        eval(&self.0, dataset, index, candidates)
    }
}

/// Compile and evaluate in one step; `None` keeps every candidate
pub fn apply_filter(
    dataset: &DataSet,
    index: Option<&DataSetIndex>,
    filter: Option<&FilterNode>,
    candidates: RowSet,
    options: &QueryOptions,
) -> Result<RowSet> {
    match filter {
        None => Ok(candidates),
        Some(node) => {
            let compiled = CompiledFilter::compile(dataset, node, options)?;
            let index = index.filter(|_| options.use_indices);
            Ok(compiled.apply(dataset, index, &candidates))
        }
    }
}

fn compile_node(dataset: &DataSet, node: &FilterNode, options: &QueryOptions) -> Result<Node> {
    let children = |nodes: &[FilterNode]| -> Result<Vec<Node>> {
        nodes
            .iter()
            .map(|n| compile_node(dataset, n, options))
            .collect()
    };
    match node {
        FilterNode::Predicate {
            column_id,
            function,
            args,
        } => {
            let column = dataset
                .column_index(column_id)
                .ok_or_else(|| QueryError::unknown_column(column_id))?;
            let matcher = compile_matcher(&dataset.columns()[column], *function, args, options)?;
            Ok(Node::Predicate(CompiledPredicate {
                column,
                matcher,
                negated: function.is_negated(),
            }))
        }
        FilterNode::And { children: c } => Ok(Node::And(children(c)?)),
        FilterNode::Or { children: c } => Ok(Node::Or(children(c)?)),
        FilterNode::Not { children: c } => Ok(Node::Not(children(c)?)),
    }
}

fn arity_error(function: CoreFunction, expected: &str, got: usize) -> QueryError {
    QueryError::invalid_request(format!(
        "{} expects {} argument(s), got {}",
        function.name(),
        expected,
        got
    ))
}

fn expect_args(function: CoreFunction, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(arity_error(function, &n.to_string(), args.len()));
    }
    Ok(())
}

/// Coerce an argument to the column's value domain
fn coerce_arg(column: &Column, function: CoreFunction, arg: &Value) -> Result<Value> {
    let mismatch = || {
        QueryError::invalid_request(format!(
            "{} on {} column '{}' cannot take a {} argument",
            function.name(),
            column.column_type(),
            column.id(),
            arg.kind()
        ))
    };
    match (column.column_type(), arg) {
        (ColumnType::Label | ColumnType::Text, Value::Text(_))
        | (ColumnType::Number, Value::Number(_))
        | (ColumnType::Date, Value::Date(_)) => Ok(arg.clone()),
        (ColumnType::Date, Value::Text(s)) => parse_date(s).map(Value::Date).ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

fn compile_matcher(
    column: &Column,
    function: CoreFunction,
    args: &[Value],
    options: &QueryOptions,
) -> Result<Matcher> {
    let arg = |i: usize| coerce_arg(column, function, &args[i]);
    let matcher = match function {
        CoreFunction::EqualsTo | CoreFunction::NotEqualsTo => {
            expect_args(function, args, 1)?;
            Matcher::Eq(arg(0)?)
        }
        CoreFunction::GreaterThan => {
            expect_args(function, args, 1)?;
            Matcher::Gt(arg(0)?)
        }
        CoreFunction::LowerThan => {
            expect_args(function, args, 1)?;
            Matcher::Lt(arg(0)?)
        }
        CoreFunction::GreaterOrEqualsTo => {
            expect_args(function, args, 1)?;
            Matcher::Ge(arg(0)?)
        }
        CoreFunction::LowerOrEqualsTo => {
            expect_args(function, args, 1)?;
            Matcher::Le(arg(0)?)
        }
        CoreFunction::Between | CoreFunction::NotBetween => {
            expect_args(function, args, 2)?;
            Matcher::Between(arg(0)?, arg(1)?)
        }
        CoreFunction::In | CoreFunction::NotIn => {
            let values = (0..args.len()).map(arg).collect::<Result<Vec<_>>>()?;
            Matcher::In(values)
        }
        CoreFunction::IsNull | CoreFunction::NotNull => {
            expect_args(function, args, 0)?;
            Matcher::IsNull
        }
        CoreFunction::LikeTo => {
            if !column.column_type().is_textual() {
                return Err(QueryError::invalid_request(format!(
                    "LIKE_TO requires a LABEL or TEXT column, '{}' is {}",
                    column.id(),
                    column.column_type()
                )));
            }
            if args.is_empty() || args.len() > 2 {
                return Err(arity_error(function, "1 or 2", args.len()));
            }
            let pattern = args[0].as_str().ok_or_else(|| {
                QueryError::invalid_request("LIKE_TO pattern must be text")
            })?;
            let case_sensitive = match args.get(1) {
                None => options.like_case_sensitive,
                Some(Value::Text(flag)) => flag.eq_ignore_ascii_case("true"),
                Some(other) => {
                    return Err(QueryError::invalid_request(format!(
                        "LIKE_TO case flag must be text, got {}",
                        other.kind()
                    )))
                }
            };
            Matcher::Like(like_regex(pattern, case_sensitive)?)
        }
        CoreFunction::TimeFrame => {
            if column.column_type() != ColumnType::Date {
                return Err(QueryError::invalid_request(format!(
                    "TIME_FRAME requires a DATE column, '{}' is {}",
                    column.id(),
                    column.column_type()
                )));
            }
            expect_args(function, args, 1)?;
            let expr = args[0]
                .as_str()
                .ok_or_else(|| QueryError::invalid_request("TIME_FRAME expression must be text"))?;
            let frame = TimeFrame::resolve(expr, options.now())?;
            Matcher::Between(Value::Date(frame.from), Value::Date(frame.to))
        }
    };
    Ok(matcher)
}

/// Translate a `%` / `_` pattern into an anchored regex
pub fn like_regex(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(!case_sensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| QueryError::invalid_request(format!("Invalid LIKE_TO pattern '{}': {}", pattern, e)))
}

fn eval(node: &Node, dataset: &DataSet, index: Option<&DataSetIndex>, candidates: &RowSet) -> RowSet {
    match node {
        Node::Predicate(p) => eval_predicate(p, dataset, index, candidates),
        Node::And(children) => {
            let mut rows = candidates.clone();
            for child in children {
                if rows.is_empty() {
                    break;
                }
                rows = eval(child, dataset, index, &rows);
            }
            rows
        }
        Node::Or(children) => children
            .iter()
            .fold(RowSet::new(), |acc, child| acc.union(&eval(child, dataset, index, candidates))),
        Node::Not(children) => {
            let mut inner = candidates.clone();
            for child in children {
                inner = eval(child, dataset, index, &inner);
            }
            candidates.difference(&inner)
        }
    }
}

fn eval_predicate(
    p: &CompiledPredicate,
    dataset: &DataSet,
    index: Option<&DataSetIndex>,
    candidates: &RowSet,
) -> RowSet {
    let indexed = index
        .and_then(|idx| idx.column(p.column))
        .and_then(|col_idx| p.matcher.index_rows(col_idx));
    if let Some(hits) = indexed {
        return if p.negated {
            candidates.difference(&hits)
        } else {
            candidates.intersect(&hits)
        };
    }
    let column = &dataset.columns()[p.column];
    let rows = candidates
        .iter()
        .filter(|&r| p.matcher.matches(column.get(r)) != p.negated)
        .collect();
    RowSet::from_sorted(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tabula_db_core::DataSetBuilder;

    fn dataset() -> DataSet {
        DataSetBuilder::new("ds")
            .label("city")
            .number("amount")
            .date("date")
            .row(vec!["Barcelona".into(), 100.into(), parse_date("2020-01-10").into()])
            .row(vec!["Madrid".into(), Value::Null, parse_date("2020-02-10").into()])
            .row(vec!["barcelona".into(), 300.into(), Value::Null])
            .row(vec![Value::Null, 50.into(), parse_date("2020-05-01").into()])
            .build()
            .unwrap()
    }

    fn run(ds: &DataSet, node: FilterNode, use_index: bool) -> Vec<usize> {
        let index = DataSetIndex::new(Arc::new(ds.clone()));
        let opts = QueryOptions::default().with_now(parse_date("2020-05-15").unwrap());
        let idx = if use_index { Some(&index) } else { None };
        apply_filter(ds, idx, Some(&node), RowSet::all(ds.row_count()), &opts)
            .unwrap()
            .into_vec()
    }

    fn both(ds: &DataSet, node: FilterNode) -> Vec<usize> {
        let scanned = run(ds, node.clone(), false);
        let indexed = run(ds, node, true);
        assert_eq!(scanned, indexed);
        scanned
    }

    #[test]
    fn test_comparisons_skip_nulls() {
        let ds = dataset();
        assert_eq!(both(&ds, FilterNode::greater_than("amount", 60)), vec![0, 2]);
        assert_eq!(both(&ds, FilterNode::lower_or_equals_to("amount", 100)), vec![0, 3]);
        assert_eq!(both(&ds, FilterNode::between("amount", 50, 100)), vec![0, 3]);
    }

    #[test]
    fn test_negations_include_nulls() {
        let ds = dataset();
        assert_eq!(both(&ds, FilterNode::not_equals_to("amount", 100)), vec![1, 2, 3]);
        assert_eq!(both(&ds, FilterNode::not_between("amount", 50, 100)), vec![1, 2]);
        assert_eq!(both(&ds, FilterNode::not_null("city")), vec![0, 1, 2]);
        assert_eq!(both(&ds, FilterNode::is_null("city")), vec![3]);
    }

    #[test]
    fn test_in_and_not_in() {
        let ds = dataset();
        let set = vec![Value::text("Madrid"), Value::text("Barcelona")];
        assert_eq!(both(&ds, FilterNode::is_in("city", set.clone())), vec![0, 1]);
        assert_eq!(both(&ds, FilterNode::not_in("city", set)), vec![2, 3]);
    }

    #[test]
    fn test_like_case_insensitive_by_default() {
        let ds = dataset();
        assert_eq!(both(&ds, FilterNode::like_to("city", "bar%")), vec![0, 2]);
        assert_eq!(both(&ds, FilterNode::like_to("city", "M_drid")), vec![1]);
        let sensitive = FilterNode::predicate(
            "city",
            CoreFunction::LikeTo,
            vec![Value::text("bar%"), Value::text("true")],
        );
        assert_eq!(both(&ds, sensitive), vec![2]);
    }

    #[test]
    fn test_like_escapes_regex_metacharacters() {
        let re = like_regex("a.b%", true).unwrap();
        assert!(re.is_match("a.bcd"));
        assert!(!re.is_match("axbcd"));
    }

    #[test]
    fn test_not_is_relative_to_candidates() {
        let ds = dataset();
        // NOT(city = Madrid) inside an AND that already dropped row 3
        let node = FilterNode::and(vec![
            FilterNode::not_null("city"),
            FilterNode::not(vec![FilterNode::equals_to("city", "Madrid")]),
        ]);
        assert_eq!(both(&ds, node), vec![0, 2]);
    }

    #[test]
    fn test_or_unions() {
        let ds = dataset();
        let node = FilterNode::or(vec![
            FilterNode::equals_to("city", "Madrid"),
            FilterNode::greater_than("amount", 200),
        ]);
        assert_eq!(both(&ds, node), vec![1, 2]);
    }

    #[test]
    fn test_date_args_accept_text() {
        let ds = dataset();
        assert_eq!(both(&ds, FilterNode::greater_or_equals_to("date", "2020-02-01")), vec![1, 3]);
    }

    #[test]
    fn test_time_frame() {
        let ds = dataset();
        assert_eq!(both(&ds, FilterNode::time_frame("date", "last 30 day")), vec![3]);
        assert_eq!(both(&ds, FilterNode::time_frame("date", "begin[year] till now")), vec![0, 1, 3]);
    }

    #[test]
    fn test_type_mismatch_is_invalid_request() {
        let ds = dataset();
        let opts = QueryOptions::default();
        let err = CompiledFilter::compile(&ds, &FilterNode::between("city", 1, 10), &opts).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
        let err = CompiledFilter::compile(&ds, &FilterNode::like_to("amount", "1%"), &opts).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRequest(_)));
    }

    #[test]
    fn test_unknown_column() {
        let ds = dataset();
        let err = CompiledFilter::compile(&ds, &FilterNode::is_null("nope"), &QueryOptions::default())
            .unwrap_err();
        assert_eq!(err, QueryError::unknown_column("nope"));
    }

    #[test]
    fn test_empty_filter_keeps_candidates() {
        let ds = dataset();
        let cands = RowSet::from_sorted(vec![1, 3]);
        let rows = apply_filter(&ds, None, None, cands.clone(), &QueryOptions::default()).unwrap();
        assert_eq!(rows, cands);
    }
}
