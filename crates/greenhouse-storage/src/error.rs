//! Storage error types

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAL corrupted: {0}")]
    WalCorrupted(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage engine is shut down")]
    ShutDown,

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Core error: {0}")]
    Core(#[from] greenhouse_core::CoreError),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

impl From<bincode::Error> for StorageError {
    fn from(e: bincode::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}
