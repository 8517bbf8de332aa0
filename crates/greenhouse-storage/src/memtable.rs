//! MemTable - In-memory timestamp-ordered index of every stored sample
//!
//! Samples are keyed by `(timestamp, sequence)` so range scans come back in
//! timestamp order regardless of arrival order, and samples sharing a
//! timestamp keep their insertion order.

use crate::error::{Result, StorageError};
use greenhouse_core::{Sample, TimeWindow, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// How many samples a scan copies between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 4096;

type SampleKey = (Timestamp, u64);

struct Inner {
    samples: BTreeMap<SampleKey, Sample>,
    next_sequence: u64,
}

/// MemTable - ordered in-memory sample index
pub struct MemTable {
    inner: RwLock<Inner>,
    /// Approximate memory usage
    size: AtomicUsize,
}

impl MemTable {
    /// Create an empty MemTable
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                samples: BTreeMap::new(),
                next_sequence: 0,
            }),
            size: AtomicUsize::new(0),
        }
    }

    /// Insert a sample, returning its insertion sequence
    pub fn insert(&self, sample: &Sample) -> u64 {
        let mut inner = self.inner.write();
        let seq = inner.next_sequence;
        inner.next_sequence += 1;
        inner.samples.insert((sample.timestamp, seq), *sample);
        self.size.fetch_add(Self::entry_size(), Ordering::Relaxed);
        seq
    }

    /// Insert multiple samples under one lock acquisition
    pub fn insert_batch(&self, samples: &[Sample]) {
        if samples.is_empty() {
            return;
        }

        let mut inner = self.inner.write();
        for sample in samples {
            let seq = inner.next_sequence;
            inner.next_sequence += 1;
            inner.samples.insert((sample.timestamp, seq), *sample);
        }
        self.size
            .fetch_add(Self::entry_size() * samples.len(), Ordering::Relaxed);
    }

    /// Copy every sample with `from <= timestamp <= to`, ascending by timestamp
    ///
    /// The read lock is held for the whole scan, so the result is a
    /// consistent snapshot. A cancelled token aborts the scan with
    /// `StorageError::Cancelled`.
    pub fn scan(
        &self,
        window: &TimeWindow,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<Sample>> {
        if window.from > window.to {
            return Ok(Vec::new());
        }

        let inner = self.inner.read();
        let range = inner.samples.range((window.from, 0)..=(window.to, u64::MAX));

        let mut out = Vec::new();
        for (i, (_, sample)) in range.enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_some_and(|c| c.is_cancelled()) {
                return Err(StorageError::Cancelled);
            }
            out.push(*sample);
        }
        Ok(out)
    }

    /// Most recent sample by timestamp
    pub fn latest(&self) -> Option<Sample> {
        self.inner
            .read()
            .samples
            .last_key_value()
            .map(|(_, s)| *s)
    }

    /// Up to `limit` most recent samples, newest first
    pub fn recent(&self, limit: usize) -> Vec<Sample> {
        self.inner
            .read()
            .samples
            .values()
            .rev()
            .take(limit)
            .copied()
            .collect()
    }

    /// Oldest and newest timestamps held, if any
    pub fn time_bounds(&self) -> Option<(Timestamp, Timestamp)> {
        let inner = self.inner.read();
        let (first, _) = inner.samples.first_key_value()?;
        let (last, _) = inner.samples.last_key_value()?;
        Some((first.0, last.0))
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.inner.read().samples.len()
    }

    /// Whether the MemTable holds no samples
    pub fn is_empty(&self) -> bool {
        self.inner.read().samples.is_empty()
    }

    /// Approximate memory usage in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    fn entry_size() -> usize {
        std::mem::size_of::<SampleKey>() + std::mem::size_of::<Sample>()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenhouse_core::Channel;
    use std::sync::Arc;
    use std::thread;

    fn sample(ts: i64, temp: f64) -> Sample {
        Sample::builder()
            .timestamp(ts)
            .value(Channel::Temperature, temp)
            .build()
            .unwrap()
    }

    #[test]
    fn test_memtable_insert_scan() {
        let memtable = MemTable::new();
        for i in 0..100 {
            memtable.insert(&sample(i * 1000, i as f64));
        }

        let samples = memtable.scan(&TimeWindow::new(0, 100_000), None).unwrap();
        assert_eq!(samples.len(), 100);
        assert_eq!(memtable.len(), 100);
        assert!(memtable.size() > 0);
    }

    #[test]
    fn test_memtable_scan_bounds_are_inclusive() {
        let memtable = MemTable::new();
        for ts in [1000, 2000, 3000] {
            memtable.insert(&sample(ts, ts as f64));
        }

        let samples = memtable.scan(&TimeWindow::new(1000, 3000), None).unwrap();
        assert_eq!(samples.len(), 3);

        let samples = memtable.scan(&TimeWindow::new(1500, 2500), None).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, 2000);

        let samples = memtable.scan(&TimeWindow::new(3001, 9000), None).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_memtable_orders_out_of_order_inserts() {
        let memtable = MemTable::new();
        memtable.insert(&sample(3000, 3.0));
        memtable.insert(&sample(1000, 1.0));
        memtable.insert(&sample(2000, 2.0));
        // Same timestamp keeps insertion order
        memtable.insert(&sample(2000, 2.5));

        let samples = memtable.scan(&TimeWindow::new(0, 10_000), None).unwrap();
        let temps: Vec<f64> = samples.iter().filter_map(|s| s.temperature).collect();
        assert_eq!(temps, vec![1.0, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_memtable_latest_and_recent() {
        let memtable = MemTable::new();
        assert!(memtable.latest().is_none());
        assert!(memtable.is_empty());

        memtable.insert_batch(&[sample(5000, 5.0), sample(1000, 1.0), sample(3000, 3.0)]);

        assert_eq!(memtable.latest().unwrap().timestamp, 5000);
        let recent: Vec<i64> = memtable.recent(2).iter().map(|s| s.timestamp).collect();
        assert_eq!(recent, vec![5000, 3000]);
        assert_eq!(memtable.recent(10).len(), 3);
        assert_eq!(memtable.time_bounds(), Some((1000, 5000)));
    }

    #[test]
    fn test_memtable_scan_cancelled() {
        let memtable = MemTable::new();
        memtable.insert(&sample(1000, 1.0));

        let token = CancellationToken::new();
        token.cancel();
        let result = memtable.scan(&TimeWindow::new(0, 10_000), Some(&token));
        assert!(matches!(result, Err(StorageError::Cancelled)));
    }

    #[test]
    fn test_memtable_concurrent_access() {
        let memtable = Arc::new(MemTable::new());
        let mut handles = vec![];

        for t in 0..4 {
            let mt = Arc::clone(&memtable);
            handles.push(thread::spawn(move || {
                for i in 0..250 {
                    mt.insert(&sample(t * 1_000_000 + i, i as f64));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let samples = memtable.scan(&TimeWindow::new(0, i64::MAX), None).unwrap();
        assert_eq!(samples.len(), 1000);
        assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
