//! Store traits
//!
//! The query service and the ingestion pipeline hold the store through these
//! traits so that either side can be driven by an alternative store (or a
//! failing one in tests).

use crate::engine::StorageEngine;
use crate::error::Result;
use greenhouse_core::{Sample, TimeWindow};
use tokio_util::sync::CancellationToken;

/// Read side of the measurement store
pub trait SampleSource: Send + Sync {
    /// All samples with `window.from <= timestamp <= window.to`, ascending by
    /// timestamp. Fails rather than returning a partial result.
    fn scan(&self, window: &TimeWindow, cancel: Option<&CancellationToken>) -> Result<Vec<Sample>>;

    /// Most recent sample by timestamp
    fn latest(&self) -> Result<Option<Sample>>;

    /// Up to `limit` most recent samples, newest first
    fn recent(&self, limit: usize) -> Result<Vec<Sample>>;

    /// Total number of stored samples
    fn count(&self) -> Result<usize>;
}

/// Write side of the measurement store
pub trait SampleSink: Send + Sync {
    /// Durably append one sample
    fn insert(&self, sample: &Sample) -> Result<()>;
}

impl SampleSource for StorageEngine {
    fn scan(&self, window: &TimeWindow, cancel: Option<&CancellationToken>) -> Result<Vec<Sample>> {
        StorageEngine::scan(self, window, cancel)
    }

    fn latest(&self) -> Result<Option<Sample>> {
        StorageEngine::latest(self)
    }

    fn recent(&self, limit: usize) -> Result<Vec<Sample>> {
        StorageEngine::recent(self, limit)
    }

    fn count(&self) -> Result<usize> {
        StorageEngine::count(self)
    }
}

impl SampleSink for StorageEngine {
    fn insert(&self, sample: &Sample) -> Result<()> {
        StorageEngine::insert(self, sample)
    }
}
