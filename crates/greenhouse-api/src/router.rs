//! API router setup

use crate::handlers::{self, AppState};
use axum::http::StatusCode;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/api/latest", get(handlers::latest))
        .route("/api/recent", get(handlers::recent))
        .route("/api/range", get(handlers::range))
        .route("/api/range/combined", get(handlers::range_combined))
        .route("/api/ingest", post(handlers::ingest))
        .route("/api/stats", get(handlers::stats))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve files under `dir` for any path no API route claims
///
/// Directory requests resolve to their `index.html`.
pub fn with_static_dir(router: Router, dir: impl AsRef<Path>) -> Router {
    router.fallback_service(ServeDir::new(dir))
}
