//! Error types for lookup execution

use tabula_db_core::CoreError;
use thiserror::Error;

/// Lookup execution errors
///
/// `Clone` so a failed single-flight computation can be handed to every
/// waiter that shared it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Error from tabula-db-core
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Malformed lookup: unknown column, bad arity, type-incompatible argument
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Aggregate applied to a column of an incompatible type
    #[error("Type error: {0}")]
    TypeError(String),
}

impl QueryError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        QueryError::InvalidRequest(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        QueryError::TypeError(msg.into())
    }

    pub fn unknown_column(id: &str) -> Self {
        QueryError::InvalidRequest(format!("Unknown column: {}", id))
    }
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;
