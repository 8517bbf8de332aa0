//! API error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use greenhouse_ingest::IngestError;
use greenhouse_query::QueryError;
use serde::Serialize;
use thiserror::Error;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query timeout exceeded")]
    Timeout,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::InvalidRange(_) | ApiError::UnknownChannel(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::InvalidRange(_) => "invalid_range",
            ApiError::UnknownChannel(_) => "unknown_channel",
            ApiError::NotFound(_) => "not_found",
            ApiError::Timeout => "timeout",
            ApiError::ServiceUnavailable(_) => "unavailable",
            ApiError::Storage(_) => "storage",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidRange { .. } | QueryError::InvalidQuery(_) => {
                ApiError::InvalidRange(e.to_string())
            }
            QueryError::UnknownChannel(name) => ApiError::UnknownChannel(name),
            QueryError::StorageUnavailable(msg) => ApiError::Storage(msg),
            QueryError::Cancelled => ApiError::Timeout,
            QueryError::Aggregation(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::MalformedSample(msg) => ApiError::BadRequest(msg),
            IngestError::QueueFull | IngestError::Closed => {
                ApiError::ServiceUnavailable(e.to_string())
            }
            IngestError::Storage(e) => ApiError::Storage(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_status() {
        let cases = [
            (QueryError::InvalidRange { from: 5, to: 1 }, StatusCode::BAD_REQUEST),
            (QueryError::UnknownChannel("co2".into()), StatusCode::BAD_REQUEST),
            (QueryError::StorageUnavailable("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (QueryError::Cancelled, StatusCode::REQUEST_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_ingest_error_status() {
        assert_eq!(
            ApiError::from(IngestError::QueueFull).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(IngestError::MalformedSample("empty payload".into())).code(),
            "bad_request"
        );
    }

    #[test]
    fn test_unknown_channel_keeps_name() {
        let err = ApiError::from(QueryError::UnknownChannel("co2".into()));
        assert_eq!(err.code(), "unknown_channel");
        assert_eq!(err.to_string(), "Unknown channel: co2");
    }
}
