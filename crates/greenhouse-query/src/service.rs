//! Range query service
//!
//! Pipeline per query: validate window -> pick step -> scan store ->
//! aggregate -> shape. Validation errors are raised before the store is
//! touched; storage failures are propagated as-is with no retry.

use crate::error::{QueryError, Result};
use crate::model::{DownsampledSeries, EnvelopeSeries, MultiChannelSeries};
use greenhouse_aggregation::{AggregateRow, BucketAggregator, StepLadder, DEFAULT_TARGET_POINTS};
use greenhouse_core::{Channel, Sample, TimeWindow, Timestamp};
use greenhouse_storage::SampleSource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Number of samples returned by `recent` when no limit is given
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Query service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryServiceConfig {
    /// Desired upper bound on rows per query
    pub target_points: u32,
    /// Allowed bucket widths (ms), ascending
    pub ladder: StepLadder,
}

impl Default for QueryServiceConfig {
    fn default() -> Self {
        Self {
            target_points: DEFAULT_TARGET_POINTS,
            ladder: StepLadder::default(),
        }
    }
}

/// Read-only query service over a measurement store
pub struct RangeQueryService {
    source: Arc<dyn SampleSource>,
    config: QueryServiceConfig,
}

impl RangeQueryService {
    /// Create a service over `source`
    pub fn new(source: Arc<dyn SampleSource>, config: QueryServiceConfig) -> Self {
        Self { source, config }
    }

    /// Create a service with the default ladder and target
    pub fn with_defaults(source: Arc<dyn SampleSource>) -> Self {
        Self::new(source, QueryServiceConfig::default())
    }

    pub fn config(&self) -> &QueryServiceConfig {
        &self.config
    }

    /// Step that a query over `[from, to]` would use
    pub fn step_for(&self, from: Timestamp, to: Timestamp) -> i64 {
        self.config.ladder.pick(from, to, self.config.target_points)
    }

    /// Downsampled averages of one channel, looked up by name
    pub fn query_downsampled(
        &self,
        from: Timestamp,
        to: Timestamp,
        channel: &str,
    ) -> Result<DownsampledSeries> {
        self.downsampled(from, to, channel, None)
    }

    /// `query_downsampled` that aborts once `cancel` fires
    pub fn query_downsampled_with_cancellation(
        &self,
        from: Timestamp,
        to: Timestamp,
        channel: &str,
        cancel: &CancellationToken,
    ) -> Result<DownsampledSeries> {
        self.downsampled(from, to, channel, Some(cancel))
    }

    /// Downsampled averages of every channel
    pub fn query_downsampled_all(&self, from: Timestamp, to: Timestamp) -> Result<MultiChannelSeries> {
        self.downsampled_all(from, to, None)
    }

    /// `query_downsampled_all` that aborts once `cancel` fires
    pub fn query_downsampled_all_with_cancellation(
        &self,
        from: Timestamp,
        to: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<MultiChannelSeries> {
        self.downsampled_all(from, to, Some(cancel))
    }

    /// Min/avg/max envelope of every channel
    pub fn query_envelope(&self, from: Timestamp, to: Timestamp) -> Result<EnvelopeSeries> {
        self.envelope(from, to, None)
    }

    /// `query_envelope` that aborts once `cancel` fires
    pub fn query_envelope_with_cancellation(
        &self,
        from: Timestamp,
        to: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<EnvelopeSeries> {
        self.envelope(from, to, Some(cancel))
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Result<Option<Sample>> {
        Ok(self.source.latest()?)
    }

    /// Up to `limit` most recent samples, newest first. A limit of 0 means
    /// `DEFAULT_RECENT_LIMIT`.
    pub fn recent(&self, limit: usize) -> Result<Vec<Sample>> {
        let limit = if limit == 0 { DEFAULT_RECENT_LIMIT } else { limit };
        Ok(self.source.recent(limit)?)
    }

    fn downsampled(
        &self,
        from: Timestamp,
        to: Timestamp,
        channel: &str,
        cancel: Option<&CancellationToken>,
    ) -> Result<DownsampledSeries> {
        let window = TimeWindow::checked(from, to)?;
        let channel: Channel = channel.parse()?;

        let (step, rows) = self.run(&window, &[channel], cancel)?;
        Ok(DownsampledSeries::from_rows(step, channel, &rows))
    }

    fn downsampled_all(
        &self,
        from: Timestamp,
        to: Timestamp,
        cancel: Option<&CancellationToken>,
    ) -> Result<MultiChannelSeries> {
        let window = TimeWindow::checked(from, to)?;
        let (step, rows) = self.run(&window, &Channel::ALL, cancel)?;
        Ok(MultiChannelSeries::from_rows(step, &rows))
    }

    fn envelope(
        &self,
        from: Timestamp,
        to: Timestamp,
        cancel: Option<&CancellationToken>,
    ) -> Result<EnvelopeSeries> {
        let window = TimeWindow::checked(from, to)?;
        let (step, rows) = self.run(&window, &Channel::ALL, cancel)?;
        Ok(EnvelopeSeries::from_rows(step, &rows))
    }

    /// Scan the (already validated) window and fold it into buckets
    fn run(
        &self,
        window: &TimeWindow,
        channels: &[Channel],
        cancel: Option<&CancellationToken>,
    ) -> Result<(i64, Vec<AggregateRow>)> {
        let start = Instant::now();
        check_cancelled(cancel)?;

        let step = self.step_for(window.from, window.to);
        let samples = self.source.scan(window, cancel)?;
        let sample_count = samples.len();

        check_cancelled(cancel)?;

        let rows = BucketAggregator::new(samples.into_iter(), step, channels)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            from = window.from,
            to = window.to,
            step,
            samples = sample_count,
            rows = rows.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Range query complete"
        );
        Ok((step, rows))
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(QueryError::Cancelled),
        _ => Ok(()),
    }
}
