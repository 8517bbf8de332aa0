//! Core data types for the greenhouse telemetry store

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Millisecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn now_millis() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

/// A named sensor channel
///
/// The set is closed: every sample carries at most one value per channel.
/// Ordering follows declaration order and is used for deterministic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Temperature,
    Humidity,
    Pressure,
    Light,
    Soil,
}

impl Channel {
    /// Every channel, in declaration order
    pub const ALL: [Channel; 5] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Pressure,
        Channel::Light,
        Channel::Soil,
    ];

    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Humidity => "humidity",
            Channel::Pressure => "pressure",
            Channel::Light => "light",
            Channel::Soil => "soil",
        }
    }

    /// Short name used by the field sensors' payloads
    pub fn short_name(&self) -> &'static str {
        match self {
            Channel::Temperature => "t",
            Channel::Humidity => "rh",
            Channel::Pressure => "p",
            Channel::Light => "light",
            Channel::Soil => "soil",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "temperature" | "temp" | "t" => Ok(Channel::Temperature),
            "humidity" | "hum" | "rh" => Ok(Channel::Humidity),
            "pressure" | "p" => Ok(Channel::Pressure),
            "light" => Ok(Channel::Light),
            "soil" => Ok(Channel::Soil),
            _ => Err(CoreError::UnknownChannel(s.to_string())),
        }
    }
}

/// A single timestamped reading across all channels
///
/// A missing channel means "no data", never zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in milliseconds since Unix epoch
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub light: Option<f64>,
    pub soil: Option<f64>,
}

impl Sample {
    /// Create a new sample builder
    pub fn builder() -> SampleBuilder {
        SampleBuilder::new()
    }

    /// Get the value of a channel
    pub fn get(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Humidity => self.humidity,
            Channel::Pressure => self.pressure,
            Channel::Light => self.light,
            Channel::Soil => self.soil,
        }
    }

    /// Set (or clear) the value of a channel
    pub fn set(&mut self, channel: Channel, value: Option<f64>) {
        let slot = match channel {
            Channel::Temperature => &mut self.temperature,
            Channel::Humidity => &mut self.humidity,
            Channel::Pressure => &mut self.pressure,
            Channel::Light => &mut self.light,
            Channel::Soil => &mut self.soil,
        };
        *slot = value;
    }

    /// Iterate over the channels that carry a value
    pub fn values(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        Channel::ALL
            .iter()
            .filter_map(move |&c| self.get(c).map(|v| (c, v)))
    }

    /// Validate the sample
    pub fn validate(&self) -> Result<()> {
        if self.timestamp < 0 {
            return Err(CoreError::InvalidTimestamp(self.timestamp));
        }
        let mut present = 0;
        for (channel, value) in self.values() {
            if !value.is_finite() {
                return Err(CoreError::NonFiniteValue {
                    channel: channel.to_string(),
                    value,
                });
            }
            present += 1;
        }
        if present == 0 {
            return Err(CoreError::NoChannels);
        }
        Ok(())
    }
}

/// Builder for constructing Samples
#[derive(Debug, Default)]
pub struct SampleBuilder {
    timestamp: Option<Timestamp>,
    sample: Sample,
}

impl SampleBuilder {
    /// Create a new sample builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timestamp
    pub fn timestamp(mut self, ts: Timestamp) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Set a channel value
    pub fn value(mut self, channel: Channel, value: f64) -> Self {
        self.sample.set(channel, Some(value));
        self
    }

    /// Build the sample, stamping it with the current time if no timestamp was set
    pub fn build(mut self) -> Result<Sample> {
        self.sample.timestamp = self.timestamp.unwrap_or_else(now_millis);
        self.sample.validate()?;
        Ok(self.sample)
    }
}

/// Query window, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start timestamp (inclusive)
    pub from: Timestamp,
    /// End timestamp (inclusive)
    pub to: Timestamp,
}

impl TimeWindow {
    /// Create a new window without validating it
    pub fn new(from: Timestamp, to: Timestamp) -> Self {
        Self { from, to }
    }

    /// Create a window, rejecting negative bounds and `from >= to`
    pub fn checked(from: Timestamp, to: Timestamp) -> Result<Self> {
        let window = Self::new(from, to);
        window.validate()?;
        Ok(window)
    }

    /// Validate the window. Invalid windows are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if self.from < 0 || self.to < 0 || self.from >= self.to {
            return Err(CoreError::InvalidRange {
                from: self.from,
                to: self.to,
            });
        }
        Ok(())
    }

    /// Check if a timestamp falls within this window
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.from && ts <= self.to
    }

    /// Length of the window in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.to.saturating_sub(self.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
            assert_eq!(channel.short_name().parse::<Channel>().unwrap(), channel);
        }
        assert_eq!("Temperature".parse::<Channel>().unwrap(), Channel::Temperature);
        assert!(matches!(
            "co2".parse::<Channel>(),
            Err(CoreError::UnknownChannel(name)) if name == "co2"
        ));
    }

    #[test]
    fn test_channel_ordering_is_declaration_order() {
        let mut channels = vec![Channel::Soil, Channel::Temperature, Channel::Light];
        channels.sort();
        assert_eq!(
            channels,
            vec![Channel::Temperature, Channel::Light, Channel::Soil]
        );
    }

    #[test]
    fn test_sample_builder() {
        let sample = Sample::builder()
            .timestamp(1_700_000_000_000)
            .value(Channel::Temperature, 21.5)
            .value(Channel::Soil, 512.0)
            .build()
            .unwrap();

        assert_eq!(sample.timestamp, 1_700_000_000_000);
        assert_eq!(sample.get(Channel::Temperature), Some(21.5));
        assert_eq!(sample.get(Channel::Soil), Some(512.0));
        assert_eq!(sample.get(Channel::Humidity), None);
        assert_eq!(sample.values().count(), 2);
    }

    #[test]
    fn test_sample_builder_stamps_now() {
        let before = now_millis();
        let sample = Sample::builder()
            .value(Channel::Light, 300.0)
            .build()
            .unwrap();
        assert!(sample.timestamp >= before);
    }

    #[test]
    fn test_sample_validation() {
        // No channels
        assert!(matches!(
            Sample::builder().timestamp(1).build(),
            Err(CoreError::NoChannels)
        ));

        // Negative timestamp
        assert!(matches!(
            Sample::builder()
                .timestamp(-5)
                .value(Channel::Pressure, 1013.0)
                .build(),
            Err(CoreError::InvalidTimestamp(-5))
        ));

        // Non-finite value
        assert!(matches!(
            Sample::builder()
                .timestamp(1)
                .value(Channel::Humidity, f64::NAN)
                .build(),
            Err(CoreError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn test_time_window() {
        let window = TimeWindow::checked(100, 200).unwrap();

        assert!(window.contains(100));
        assert!(window.contains(150));
        assert!(window.contains(200)); // end is inclusive
        assert!(!window.contains(201));
        assert!(!window.contains(99));
        assert_eq!(window.duration_millis(), 100);

        assert!(TimeWindow::checked(200, 200).is_err());
        assert!(TimeWindow::checked(300, 200).is_err());
        assert!(matches!(
            TimeWindow::checked(-1, 200),
            Err(CoreError::InvalidRange { from: -1, to: 200 })
        ));
    }

    #[test]
    fn test_sample_serialization() {
        let sample = Sample::builder()
            .timestamp(1_700_000_000_000)
            .value(Channel::Temperature, 21.5)
            .value(Channel::Humidity, 40.0)
            .build()
            .unwrap();

        // WAL payloads are bincode
        let encoded = bincode::serialize(&sample).unwrap();
        let decoded: Sample = bincode::deserialize(&encoded).unwrap();
        assert_eq!(sample, decoded);

        // API responses are JSON, keyed by wire name
        let json = serde_json::to_value(sample).unwrap();
        assert_eq!(json["ts"], 1_700_000_000_000_i64);
        assert_eq!(json["temperature"], 21.5);
        assert!(json["pressure"].is_null());
    }
}
