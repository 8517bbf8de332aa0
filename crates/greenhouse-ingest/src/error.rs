//! Ingestion error types

use thiserror::Error;

/// Ingestion errors
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed sample: {0}")]
    MalformedSample(String),

    #[error("Ingestion queue is full")]
    QueueFull,

    #[error("Ingestion pipeline is closed")]
    Closed,

    #[error("Storage error: {0}")]
    Storage(#[from] greenhouse_storage::StorageError),
}

/// Result type for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

impl From<serde_json::Error> for IngestError {
    fn from(e: serde_json::Error) -> Self {
        IngestError::MalformedSample(e.to_string())
    }
}

impl From<greenhouse_core::CoreError> for IngestError {
    fn from(e: greenhouse_core::CoreError) -> Self {
        IngestError::MalformedSample(e.to_string())
    }
}
