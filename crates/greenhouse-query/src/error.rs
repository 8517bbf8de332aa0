//! Query error types

use greenhouse_aggregation::AggregationError;
use greenhouse_core::CoreError;
use greenhouse_storage::StorageError;
use thiserror::Error;

/// Query errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid range: from={from}, to={to}")]
    InvalidRange { from: i64, to: i64 },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Query cancelled")]
    Cancelled,
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl From<StorageError> for QueryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Cancelled => QueryError::Cancelled,
            other => QueryError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<CoreError> for QueryError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidRange { from, to } => QueryError::InvalidRange { from, to },
            CoreError::UnknownChannel(name) => QueryError::UnknownChannel(name),
            other => QueryError::InvalidQuery(other.to_string()),
        }
    }
}

impl From<AggregationError> for QueryError {
    fn from(e: AggregationError) -> Self {
        QueryError::Aggregation(e.to_string())
    }
}
