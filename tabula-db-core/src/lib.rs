//! # Tabula DB Core
//!
//! In-memory tabular data model shared by the query engine and the
//! registry layer.
//!
//! This crate provides:
//! - `Value`: a single cell (null, number, text or date) with a total order
//! - `Column` / `DataSet`: typed, equal-length columns addressed by row position
//! - `DataSetIndex`: lazily built per-column value → rows indices
//! - `RowSet`: sorted row positions with set algebra
//!
//! Datasets are immutable once built. Replacing data means building a new
//! `DataSet`; derived structures such as indices are never patched in place.

pub mod column;
pub mod dataset;
pub mod error;
pub mod index;
pub mod row_set;
pub mod value;

pub use column::{Column, ColumnType};
pub use dataset::{DataSet, DataSetBuilder, DataSetMetadata};
pub use error::{CoreError, Result};
pub use index::{ColumnIndex, DataSetIndex};
pub use row_set::RowSet;
pub use value::{format_number, parse_date, Value, DATE_FORMAT};
