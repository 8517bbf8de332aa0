//! Greenhouse Query - Range query service
//!
//! This crate turns a time window into a bounded number of rows:
//! - Step selection from the configured ladder
//! - Ordered store scan of the window
//! - Streaming bucket aggregation into averages or min/avg/max envelopes

pub mod error;
pub mod model;
pub mod service;

pub use error::{QueryError, Result};
pub use model::{
    ChannelAverages, DownsampledPoint, DownsampledSeries, Envelope, EnvelopeRow, EnvelopeSeries,
    MultiChannelSeries,
};
pub use service::{QueryServiceConfig, RangeQueryService, DEFAULT_RECENT_LIMIT};
