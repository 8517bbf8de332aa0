//! Bounded ingestion queue with a single consumer task

use crate::error::{IngestError, Result};
use crate::payload::{parse_payload, TimestampPolicy};
use greenhouse_core::{now_millis, Timestamp};
use greenhouse_storage::SampleSink;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of payloads waiting for the consumer
    pub queue_capacity: usize,
    /// Which timestamp stored samples carry
    pub timestamp_policy: TimestampPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timestamp_policy: TimestampPolicy::default(),
        }
    }
}

/// Counters for the ingestion pipeline
#[derive(Debug, Default)]
pub struct IngestStats {
    pub received: AtomicU64,
    pub stored: AtomicU64,
    pub malformed: AtomicU64,
    pub storage_errors: AtomicU64,
    pub rejected: AtomicU64,
}

/// Point-in-time copy of `IngestStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub stored: u64,
    pub malformed: u64,
    pub storage_errors: u64,
    pub rejected: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// A payload waiting in the queue, stamped with its arrival time
struct QueuedPayload {
    bytes: Vec<u8>,
    received_at: Timestamp,
}

/// Producer side of the pipeline; cheap to clone
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<QueuedPayload>,
    stats: Arc<IngestStats>,
}

impl IngestHandle {
    /// Enqueue a payload, waiting for room if the queue is full
    pub async fn submit(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let item = QueuedPayload {
            bytes: payload.into(),
            received_at: now_millis(),
        };
        self.tx.send(item).await.map_err(|_| IngestError::Closed)?;
        self.stats.received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Enqueue a payload, failing with `QueueFull` instead of waiting
    pub fn try_submit(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let item = QueuedPayload {
            bytes: payload.into(),
            received_at: now_millis(),
        };
        match self.tx.try_send(item) {
            Ok(()) => {
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                Err(IngestError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IngestError::Closed),
        }
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }
}

/// The consumer side of the pipeline
pub struct IngestPipeline {
    sink: Arc<dyn SampleSink>,
    policy: TimestampPolicy,
    stats: Arc<IngestStats>,
}

impl IngestPipeline {
    /// Spawn the consumer task on the current runtime
    ///
    /// The task runs until every handle is dropped or `shutdown` fires; on
    /// shutdown it stops accepting payloads and drains what is already queued.
    pub fn start(
        sink: Arc<dyn SampleSink>,
        config: IngestConfig,
        shutdown: CancellationToken,
    ) -> (IngestHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(IngestStats::new());

        let pipeline = Self {
            sink,
            policy: config.timestamp_policy,
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(pipeline.run(rx, shutdown));

        (IngestHandle { tx, stats }, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<QueuedPayload>, shutdown: CancellationToken) {
        info!(policy = ?self.policy, "Ingestion consumer started");

        loop {
            tokio::select! {
                item = rx.recv() => match item {
                    Some(item) => self.process(item).await,
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    rx.close();
                    while let Some(item) = rx.recv().await {
                        self.process(item).await;
                    }
                    break;
                }
            }
        }

        let stats = self.stats.snapshot();
        info!(
            stored = stats.stored,
            malformed = stats.malformed,
            storage_errors = stats.storage_errors,
            "Ingestion consumer stopped"
        );
    }

    async fn process(&self, item: QueuedPayload) {
        let sample = match parse_payload(&item.bytes)
            .and_then(|payload| payload.into_sample(self.policy, item.received_at))
        {
            Ok(sample) => sample,
            Err(e) => {
                warn!(error = %e, "Dropping malformed payload");
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let sink = Arc::clone(&self.sink);
        let result = tokio::task::spawn_blocking(move || sink.insert(&sample)).await;

        match result {
            Ok(Ok(())) => {
                self.stats.stored.fetch_add(1, Ordering::Relaxed);
                debug!(ts = sample.timestamp, "Stored sample");
            }
            Ok(Err(e)) => {
                error!(error = %e, ts = sample.timestamp, "Failed to store sample");
                self.stats.storage_errors.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!(error = %e, "Insert task failed");
                self.stats.storage_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenhouse_core::{Sample, TimeWindow};
    use greenhouse_storage::{
        Result as StorageResult, StorageEngine, StorageEngineConfig, StorageError, WalDurability,
    };
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Sink that records samples in memory, optionally failing every insert
    #[derive(Default)]
    struct Recorder {
        samples: Mutex<Vec<Sample>>,
        fail: bool,
    }

    impl SampleSink for Recorder {
        fn insert(&self, sample: &Sample) -> StorageResult<()> {
            if self.fail {
                return Err(StorageError::ShutDown);
            }
            self.samples.lock().unwrap().push(*sample);
            Ok(())
        }
    }

    async fn run_to_completion(handle: IngestHandle, task: JoinHandle<()>) -> IngestStatsSnapshot {
        let stats = Arc::clone(handle.stats());
        drop(handle);
        task.await.unwrap();
        stats.snapshot()
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dropped() {
        let sink = Arc::new(Recorder::default());
        let (handle, task) =
            IngestPipeline::start(sink.clone(), IngestConfig::default(), CancellationToken::new());

        handle.submit(&br#"{"t": 21.0, "rh": 40}"#[..]).await.unwrap();
        handle.submit(&b"{garbage"[..]).await.unwrap();
        handle.submit(&br#"{"ts": 12}"#[..]).await.unwrap();
        handle.submit(&br#"{"soil": 600}"#[..]).await.unwrap();

        let stats = run_to_completion(handle, task).await;
        assert_eq!(stats.received, 4);
        assert_eq!(stats.stored, 2);
        assert_eq!(stats.malformed, 2);

        let samples = sink.samples.lock().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].temperature, Some(21.0));
        assert_eq!(samples[1].soil, Some(600.0));
    }

    #[tokio::test]
    async fn test_receipt_time_overwrites_payload_ts() {
        let sink = Arc::new(Recorder::default());
        let (handle, task) =
            IngestPipeline::start(sink.clone(), IngestConfig::default(), CancellationToken::new());

        let before = now_millis();
        handle.submit(&br#"{"ts": 42, "t": 20.0}"#[..]).await.unwrap();
        run_to_completion(handle, task).await;

        let samples = sink.samples.lock().unwrap();
        assert!(samples[0].timestamp >= before);
    }

    #[tokio::test]
    async fn test_when_missing_policy_keeps_ts() {
        let sink = Arc::new(Recorder::default());
        let config = IngestConfig {
            timestamp_policy: TimestampPolicy::WhenMissing,
            ..Default::default()
        };
        let (handle, task) = IngestPipeline::start(sink.clone(), config, CancellationToken::new());

        handle.submit(&br#"{"ts": 42, "t": 20.0}"#[..]).await.unwrap();
        run_to_completion(handle, task).await;

        assert_eq!(sink.samples.lock().unwrap()[0].timestamp, 42);
    }

    #[tokio::test]
    async fn test_storage_errors_are_counted() {
        let sink = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let (handle, task) =
            IngestPipeline::start(sink.clone(), IngestConfig::default(), CancellationToken::new());

        handle.submit(&br#"{"t": 20.0}"#[..]).await.unwrap();
        handle.submit(&br#"{"t": 21.0}"#[..]).await.unwrap();

        let stats = run_to_completion(handle, task).await;
        assert_eq!(stats.storage_errors, 2);
        assert_eq!(stats.stored, 0);
    }

    #[tokio::test]
    async fn test_try_submit_reports_full_queue() {
        let sink = Arc::new(Recorder::default());
        let config = IngestConfig {
            queue_capacity: 1,
            ..Default::default()
        };
        let shutdown = CancellationToken::new();

        // Current-thread runtime: the consumer only runs once this task awaits
        let (handle, task) = IngestPipeline::start(sink.clone(), config, shutdown.clone());
        handle.try_submit(&br#"{"t": 20.0}"#[..]).unwrap();
        assert!(matches!(
            handle.try_submit(&br#"{"t": 21.0}"#[..]),
            Err(IngestError::QueueFull)
        ));
        assert_eq!(handle.stats().snapshot().rejected, 1);

        shutdown.cancel();
        task.await.unwrap();
        assert_eq!(sink.samples.lock().unwrap().len(), 1);

        // Consumer is gone
        assert!(matches!(
            handle.try_submit(&br#"{"t": 22.0}"#[..]),
            Err(IngestError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_pipeline_into_storage_engine() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(
            StorageEngine::new(StorageEngineConfig {
                data_dir: dir.path().to_path_buf(),
                wal_durability: WalDurability::None,
                ..Default::default()
            })
            .unwrap(),
        );

        let (handle, task) =
            IngestPipeline::start(engine.clone(), IngestConfig::default(), CancellationToken::new());
        for i in 0..20 {
            let payload = format!(r#"{{"t": {}, "rh": 50, "p": 1013.2}}"#, 18 + i % 5);
            handle.submit(payload).await.unwrap();
        }
        let stats = run_to_completion(handle, task).await;
        assert_eq!(stats.stored, 20);

        let samples = engine
            .scan(&TimeWindow::new(0, now_millis() + 1_000), None)
            .unwrap();
        assert_eq!(samples.len(), 20);
        assert_eq!(engine.count().unwrap(), 20);
        engine.shutdown().unwrap();
    }
}
