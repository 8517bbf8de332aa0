//! Greenhouse API - HTTP surface of the telemetry store
//!
//! This crate provides:
//! - Health and ready endpoints that answer during start-up
//! - Latest/recent sample lookups
//! - Downsampled and envelope range queries, time-boxed and cancellable
//! - An ingestion endpoint feeding the ingestion queue
//! - Optional static file serving for a dashboard frontend

pub mod error;
pub mod handlers;
pub mod router;

pub use error::{ApiError, Result};
pub use handlers::{AppState, StartupPhase, StartupState};
pub use router::{create_router, with_static_dir};
