//! Query result model
//!
//! Every series carries the step it was computed with and its rows under
//! `data`, ascending by bucket timestamp. Per-channel maps are ordered so the
//! same rows always serialize to the same bytes.

use greenhouse_aggregation::AggregateRow;
use greenhouse_core::{Channel, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One bucket of a single-channel series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsampledPoint {
    /// Bucket start
    pub ts: Timestamp,
    pub avg: f64,
}

/// Single-channel downsampled series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownsampledSeries {
    /// Bucket width in milliseconds
    pub step: i64,
    #[serde(rename = "data")]
    pub points: Vec<DownsampledPoint>,
}

impl DownsampledSeries {
    pub fn from_rows(step: i64, channel: Channel, rows: &[AggregateRow]) -> Self {
        let points = rows
            .iter()
            .filter_map(|row| {
                row.get(channel).map(|agg| DownsampledPoint {
                    ts: row.bucket_ts,
                    avg: agg.avg,
                })
            })
            .collect();
        Self { step, points }
    }
}

/// One bucket of the all-channel average series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelAverages {
    /// Bucket start
    pub ts: Timestamp,
    #[serde(flatten)]
    pub values: BTreeMap<Channel, f64>,
}

/// Downsampled averages for every channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiChannelSeries {
    /// Bucket width in milliseconds
    pub step: i64,
    #[serde(rename = "data")]
    pub rows: Vec<ChannelAverages>,
}

impl MultiChannelSeries {
    pub fn from_rows(step: i64, rows: &[AggregateRow]) -> Self {
        let rows = rows
            .iter()
            .map(|row| ChannelAverages {
                ts: row.bucket_ts,
                values: row
                    .channels
                    .iter()
                    .map(|(&channel, agg)| (channel, agg.avg))
                    .collect(),
            })
            .collect();
        Self { step, rows }
    }
}

/// Average, minimum and maximum of a channel within one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// One bucket of the envelope series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeRow {
    /// Bucket start
    pub ts: Timestamp,
    #[serde(flatten)]
    pub channels: BTreeMap<Channel, Envelope>,
}

impl EnvelopeRow {
    pub fn get(&self, channel: Channel) -> Option<&Envelope> {
        self.channels.get(&channel)
    }
}

/// Combined multi-channel min/avg/max series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSeries {
    /// Bucket width in milliseconds
    pub step: i64,
    #[serde(rename = "data")]
    pub rows: Vec<EnvelopeRow>,
}

impl EnvelopeSeries {
    pub fn from_rows(step: i64, rows: &[AggregateRow]) -> Self {
        let rows = rows
            .iter()
            .map(|row| EnvelopeRow {
                ts: row.bucket_ts,
                channels: row
                    .channels
                    .iter()
                    .map(|(&channel, agg)| {
                        (
                            channel,
                            Envelope {
                                avg: agg.avg,
                                min: agg.min,
                                max: agg.max,
                            },
                        )
                    })
                    .collect(),
            })
            .collect();
        Self { step, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenhouse_aggregation::ChannelAggregate;

    fn row(ts: i64, channels: &[(Channel, f64, f64, f64)]) -> AggregateRow {
        AggregateRow {
            bucket_ts: ts,
            channels: channels
                .iter()
                .map(|&(c, avg, min, max)| {
                    (
                        c,
                        ChannelAggregate {
                            count: 1,
                            avg,
                            min,
                            max,
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_downsampled_skips_rows_without_channel() {
        let rows = vec![
            row(0, &[(Channel::Temperature, 20.0, 19.0, 21.0)]),
            row(60_000, &[(Channel::Humidity, 40.0, 40.0, 40.0)]),
        ];
        let series = DownsampledSeries::from_rows(60_000, Channel::Temperature, &rows);
        assert_eq!(series.points, vec![DownsampledPoint { ts: 0, avg: 20.0 }]);
    }

    #[test]
    fn test_envelope_json_shape() {
        let rows = vec![row(
            60_000,
            &[
                (Channel::Soil, 500.0, 480.0, 520.0),
                (Channel::Temperature, 20.0, 19.0, 21.0),
            ],
        )];
        let series = EnvelopeSeries::from_rows(60_000, &rows);
        let json = serde_json::to_string(&series).unwrap();

        assert_eq!(
            json,
            concat!(
                r#"{"step":60000,"data":[{"ts":60000,"#,
                r#""temperature":{"avg":20.0,"min":19.0,"max":21.0},"#,
                r#""soil":{"avg":500.0,"min":480.0,"max":520.0}}]}"#
            )
        );
    }

    #[test]
    fn test_multi_channel_json_shape() {
        let rows = vec![row(
            0,
            &[
                (Channel::Humidity, 41.5, 40.0, 43.0),
                (Channel::Light, 300.0, 300.0, 300.0),
            ],
        )];
        let series = MultiChannelSeries::from_rows(60_000, &rows);
        let value = serde_json::to_value(&series).unwrap();

        assert_eq!(value["step"], 60_000);
        assert_eq!(value["data"][0]["ts"], 0);
        assert_eq!(value["data"][0]["humidity"], 41.5);
        assert_eq!(value["data"][0]["light"], 300.0);
        assert!(value["data"][0].get("temperature").is_none());
    }
}
