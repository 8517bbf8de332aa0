//! Sensor payload parsing
//!
//! Field sensors publish JSON objects such as
//! `{"ts": 1700000000000, "t": 21.4, "rh": 48.0, "p": 1012.6, "light": 320, "soil": 611}`.
//! Every field is optional and the long channel names are accepted as
//! aliases. Unknown fields are ignored.

use crate::error::{IngestError, Result};
use greenhouse_core::{Sample, Timestamp};
use serde::{Deserialize, Serialize};

/// Raw sensor payload as published by the field nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    #[serde(default)]
    pub ts: Option<Timestamp>,
    #[serde(default, alias = "temperature")]
    pub t: Option<f64>,
    #[serde(default, alias = "humidity")]
    pub rh: Option<f64>,
    #[serde(default, alias = "pressure")]
    pub p: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
    #[serde(default)]
    pub soil: Option<f64>,
}

/// Which timestamp a stored sample carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampPolicy {
    /// Always use the time the payload was received
    #[default]
    AlwaysReceipt,
    /// Keep a valid payload timestamp, use receipt time otherwise
    WhenMissing,
}

impl TimestampPolicy {
    /// Timestamp to store for a payload received at `received_at`
    pub fn resolve(&self, payload_ts: Option<Timestamp>, received_at: Timestamp) -> Timestamp {
        match (self, payload_ts) {
            (TimestampPolicy::WhenMissing, Some(ts)) if ts >= 0 => ts,
            _ => received_at,
        }
    }
}

impl SensorPayload {
    /// Turn the payload into a validated sample
    pub fn into_sample(self, policy: TimestampPolicy, received_at: Timestamp) -> Result<Sample> {
        let sample = Sample {
            timestamp: policy.resolve(self.ts, received_at),
            temperature: self.t,
            humidity: self.rh,
            pressure: self.p,
            light: self.light,
            soil: self.soil,
        };
        sample.validate()?;
        Ok(sample)
    }
}

/// Parse a raw payload
pub fn parse_payload(bytes: &[u8]) -> Result<SensorPayload> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(IngestError::MalformedSample("empty payload".to_string()));
    }
    Ok(serde_json::from_slice(bytes)?)
}
