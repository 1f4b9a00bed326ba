//! # Tabula DB Query
//!
//! Executes declarative lookups against an in-memory [`DataSet`]:
//!
//! 1. **Filter**: predicate trees over columns, index-accelerated where possible
//! 2. **Group**: raw-value, fixed-calendar or dynamic-range buckets, with aggregates
//! 3. **Sort**: stable multi-criteria ordering with a configurable null policy
//! 4. **Select**: column projection in the requested order, then an optional row window
//!
//! Every stage is synchronous. Structural problems surface as
//! [`QueryError::InvalidRequest`] or [`QueryError::TypeError`] and abort
//! the whole lookup.
//!
//! [`DataSet`]: tabula_db_core::DataSet

pub mod aggregate;
pub mod calendar;
pub mod error;
pub mod execute;
pub mod filter;
pub mod fingerprint;
pub mod groupby;
pub mod interval;
pub mod lookup;
pub mod options;
pub mod project;
pub mod sort;
pub mod timeframe;

pub use calendar::DateIntervalType;
pub use error::{QueryError, Result};
pub use execute::execute;
pub use filter::{apply_filter, CompiledFilter};
pub use fingerprint::Fingerprint;
pub use groupby::{group, GroupBucket, GroupResult};
pub use interval::{Interval, IntervalBuilder};
pub use lookup::{
    AggregateColumn, AggregateFunction, ColumnGroup, CoreFunction, DataSetLookup, FilterNode,
    GroupOp, GroupStrategy, SortCriterion, SortOrder,
};
pub use options::{NullOrdering, QueryOptions};
pub use sort::sort_rows;
pub use timeframe::{TimeAmount, TimeFrame};
