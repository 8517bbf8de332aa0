//! Greenhouse Ingest - Sensor ingestion pipeline
//!
//! Transports (HTTP, a broker subscription, ...) hand raw payloads to an
//! `IngestHandle`. A single consumer task parses each payload, applies the
//! timestamp policy, validates the sample and stores it. Bad payloads are
//! logged, counted and dropped without stopping the consumer.

pub mod error;
pub mod payload;
pub mod pipeline;

pub use error::{IngestError, Result};
pub use payload::{parse_payload, SensorPayload, TimestampPolicy};
pub use pipeline::{IngestConfig, IngestHandle, IngestPipeline, IngestStats, IngestStatsSnapshot};
