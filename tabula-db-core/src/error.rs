//! Error types for the dataset model

use thiserror::Error;

/// Errors raised while building or addressing a dataset
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Columns of a dataset disagree on their length
    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Two columns share the same (case-insensitive) id
    #[error("Duplicate column id: {0}")]
    DuplicateColumn(String),

    /// Column id not present in the dataset
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Value does not fit the declared column type
    #[error("Invalid value for column '{column}': {message}")]
    InvalidValue { column: String, message: String },
}

impl CoreError {
    pub fn unknown_column(id: impl Into<String>) -> Self {
        CoreError::UnknownColumn(id.into())
    }

    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::InvalidValue {
            column: column.into(),
            message: message.into(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
