//! Error types for greenhouse-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("Invalid range: from={from}, to={to}")]
    InvalidRange { from: i64, to: i64 },

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Sample carries no channel values")]
    NoChannels,

    #[error("Non-finite value for channel {channel}: {value}")]
    NonFiniteValue { channel: String, value: f64 },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
