//! Streaming bucket aggregation
//!
//! Samples must arrive ordered by timestamp. Each sample is folded into the
//! open bucket's per-channel accumulators; a bucket is emitted as soon as a
//! sample with a strictly greater bucket key shows up, and the last bucket is
//! emitted when the input ends. Memory use is one bucket regardless of how
//! many samples the window holds.

use crate::error::{AggregationError, Result};
use greenhouse_core::{Channel, Sample, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Left edge of the bucket holding `ts`: `floor(ts / step) * step`
pub fn bucket_key(ts: Timestamp, step: i64) -> Timestamp {
    ts.div_euclid(step) * step
}

/// Per-channel running state for one bucket
#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn finish(&self) -> ChannelAggregate {
        ChannelAggregate {
            count: self.count,
            avg: self.sum / self.count as f64,
            min: self.min,
            max: self.max,
        }
    }
}

/// Summary of one channel within one bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelAggregate {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// One occupied bucket
///
/// Only channels that had at least one value in the bucket are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub bucket_ts: Timestamp,
    pub channels: BTreeMap<Channel, ChannelAggregate>,
}

impl AggregateRow {
    /// Aggregate for a single channel, if it had values in this bucket
    pub fn get(&self, channel: Channel) -> Option<&ChannelAggregate> {
        self.channels.get(&channel)
    }
}

struct OpenBucket {
    key: Timestamp,
    accumulators: BTreeMap<Channel, Accumulator>,
}

impl OpenBucket {
    fn new(key: Timestamp) -> Self {
        Self {
            key,
            accumulators: BTreeMap::new(),
        }
    }

    fn fold(&mut self, sample: &Sample, channels: &[Channel]) {
        for &channel in channels {
            if let Some(value) = sample.get(channel) {
                self.accumulators
                    .entry(channel)
                    .and_modify(|acc| acc.add(value))
                    .or_insert_with(|| Accumulator::new(value));
            }
        }
    }

    /// `None` when no requested channel had a value in this bucket
    fn finish(self) -> Option<AggregateRow> {
        if self.accumulators.is_empty() {
            return None;
        }
        Some(AggregateRow {
            bucket_ts: self.key,
            channels: self
                .accumulators
                .into_iter()
                .map(|(channel, acc)| (channel, acc.finish()))
                .collect(),
        })
    }
}

/// Iterator adapter turning ordered samples into ordered aggregate rows
///
/// Yields `Err(OutOfOrder)` once and then stops if a sample's bucket precedes
/// the open bucket.
pub struct BucketAggregator<I> {
    input: I,
    step: i64,
    channels: Vec<Channel>,
    open: Option<OpenBucket>,
    done: bool,
}

impl<I> BucketAggregator<I>
where
    I: Iterator<Item = Sample>,
{
    /// Create an aggregator folding `channels` over `input` with bucket width `step`
    pub fn new(input: I, step: i64, channels: &[Channel]) -> Result<Self> {
        if step <= 0 {
            return Err(AggregationError::InvalidStep(step));
        }

        let mut channels = channels.to_vec();
        channels.sort();
        channels.dedup();

        Ok(Self {
            input,
            step,
            channels,
            open: None,
            done: false,
        })
    }
}

impl<I> Iterator for BucketAggregator<I>
where
    I: Iterator<Item = Sample>,
{
    type Item = Result<AggregateRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        while let Some(sample) = self.input.next() {
            let key = bucket_key(sample.timestamp, self.step);

            let open = self.open.get_or_insert_with(|| OpenBucket::new(key));
            if key == open.key {
                open.fold(&sample, &self.channels);
                continue;
            }

            if key < open.key {
                self.done = true;
                return Some(Err(AggregationError::OutOfOrder {
                    bucket: key,
                    previous: open.key,
                }));
            }

            let mut next = OpenBucket::new(key);
            next.fold(&sample, &self.channels);
            let closed = std::mem::replace(open, next);
            if let Some(row) = closed.finish() {
                return Some(Ok(row));
            }
        }

        self.done = true;
        self.open.take().and_then(OpenBucket::finish).map(Ok)
    }
}

/// Aggregate ordered samples into rows ascending by bucket
pub fn aggregate<I>(samples: I, step: i64, channels: &[Channel]) -> Result<Vec<AggregateRow>>
where
    I: IntoIterator<Item = Sample>,
{
    BucketAggregator::new(samples.into_iter(), step, channels)?.collect()
}
