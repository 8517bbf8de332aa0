//! Greenhouse Core - Core types for the greenhouse telemetry store
//!
//! This crate provides the fundamental data types shared by every other crate:
//! - `Timestamp`: Millisecond-precision Unix epoch timestamps
//! - `Channel`: The closed set of sensor channels (temperature, humidity, ...)
//! - `Sample`: One timestamped multi-channel reading
//! - `TimeWindow`: An inclusive `[from, to]` query window

pub mod error;
pub mod types;

pub use error::{CoreError, Result};
pub use types::*;
