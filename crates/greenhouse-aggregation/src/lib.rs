//! Greenhouse Aggregation - Downsampling primitives
//!
//! This crate provides:
//! - Step selection from a fixed ladder of bucket widths
//! - Streaming bucket aggregation (count/sum/min/max per bucket and channel)

pub mod bucket;
pub mod error;
pub mod step;

pub use bucket::{aggregate, bucket_key, AggregateRow, BucketAggregator, ChannelAggregate};
pub use error::{AggregationError, Result};
pub use step::{pick_step, StepLadder, DEFAULT_STEPS, DEFAULT_TARGET_POINTS};
