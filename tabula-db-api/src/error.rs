//! Error types for the dataset API

use tabula_db_core::CoreError;
use tabula_db_query::QueryError;
use thiserror::Error;

/// Failure reported by a [`DataSetProvider`](crate::provider::DataSetProvider)
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Provider '{provider}' failed for dataset '{uuid}': {message}")]
pub struct ProviderError {
    pub provider: String,
    pub uuid: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        uuid: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            uuid: uuid.into(),
            message: message.into(),
        }
    }
}

/// API errors
///
/// `Clone` so that every waiter on a shared computation gets the same
/// failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Dataset UUID is not registered (or no longer is)
    #[error("Dataset not found: {0}")]
    NotFound(String),

    /// Malformed lookup
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Aggregate applied to an incompatible column type
    #[error("Type error: {0}")]
    TypeError(String),

    /// Propagated unchanged from a provider
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn not_found(uuid: impl Into<String>) -> Self {
        ApiError::NotFound(uuid.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        ApiError::InvalidRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    /// HTTP status code for the error, for transport layers
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_) | ApiError::TypeError(_) => 400,
            ApiError::Provider(_) => 502,
            ApiError::Internal(_) => 500,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnknownColumn(_)
            | CoreError::DuplicateColumn(_)
            | CoreError::InvalidValue { .. } => ApiError::InvalidRequest(e.to_string()),
            CoreError::ColumnLengthMismatch { .. } => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Core(core) => core.into(),
            QueryError::InvalidRequest(msg) => ApiError::InvalidRequest(msg),
            QueryError::TypeError(msg) => ApiError::TypeError(msg),
        }
    }
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
