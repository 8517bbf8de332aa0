//! Aggregation error types

use thiserror::Error;

/// Aggregation errors
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Invalid step: {0} (must be positive)")]
    InvalidStep(i64),

    #[error("Invalid step ladder: {0}")]
    InvalidLadder(String),

    #[error("Out-of-order sample: bucket {bucket} after bucket {previous}")]
    OutOfOrder { bucket: i64, previous: i64 },
}

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, AggregationError>;
