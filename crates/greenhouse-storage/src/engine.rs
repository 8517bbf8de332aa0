//! Storage Engine - Coordinator for the measurement store
//!
//! - Write path: validate -> WAL -> MemTable, serialized by a single write lock
//! - Read path: MemTable snapshot scans
//! - Start-up: replay every WAL file into a fresh MemTable

use crate::error::{Result, StorageError};
use crate::memtable::MemTable;
use crate::wal::{WalDurability, WalReader, WalWriter};
use greenhouse_core::{Sample, TimeWindow, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEngineConfig {
    /// Data directory
    pub data_dir: PathBuf,
    /// WAL directory (defaults to data_dir/wal)
    pub wal_dir: Option<PathBuf>,
    /// WAL durability mode
    pub wal_durability: WalDurability,
    /// Maximum size of a single WAL file before rotation (bytes)
    pub wal_max_file_size: u64,
}

impl Default for StorageEngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_dir: None,
            wal_durability: WalDurability::default(),
            wal_max_file_size: crate::wal::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl StorageEngineConfig {
    /// Resolved WAL directory
    pub fn wal_path(&self) -> PathBuf {
        self.wal_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("wal"))
    }
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub sample_count: usize,
    pub memory_bytes: usize,
    pub oldest_timestamp: Option<Timestamp>,
    pub newest_timestamp: Option<Timestamp>,
    pub wal_sequence: u64,
}

/// Storage engine
pub struct StorageEngine {
    config: StorageEngineConfig,
    wal: WalWriter,
    memtable: MemTable,
    /// Keeps WAL order and MemTable order in step
    write_lock: Mutex<()>,
    running: AtomicBool,
}

impl StorageEngine {
    /// Open the store, replaying any existing WAL
    pub fn new(config: StorageEngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let wal_dir = config.wal_path();

        let memtable = MemTable::new();
        let next_sequence = Self::recover(&wal_dir, &memtable)?;

        let wal = WalWriter::new(&wal_dir, config.wal_durability)?
            .with_max_file_size(config.wal_max_file_size)
            .with_start_sequence(next_sequence);

        Ok(Self {
            config,
            wal,
            memtable,
            write_lock: Mutex::new(()),
            running: AtomicBool::new(true),
        })
    }

    /// Validate and durably store one sample
    pub fn insert(&self, sample: &Sample) -> Result<()> {
        self.insert_batch(std::slice::from_ref(sample))
    }

    /// Validate and durably store a batch of samples as one WAL entry
    pub fn insert_batch(&self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        self.ensure_running()?;

        for sample in samples {
            sample.validate()?;
        }

        let _guard = self.write_lock.lock();
        self.wal.write(samples)?;
        self.memtable.insert_batch(samples);
        Ok(())
    }

    /// Samples in `[window.from, window.to]`, ascending by timestamp
    pub fn scan(&self, window: &TimeWindow, cancel: Option<&CancellationToken>) -> Result<Vec<Sample>> {
        self.ensure_running()?;
        let samples = self.memtable.scan(window, cancel)?;
        debug!(
            from = window.from,
            to = window.to,
            samples = samples.len(),
            "Scanned window"
        );
        Ok(samples)
    }

    /// Most recent sample by timestamp
    pub fn latest(&self) -> Result<Option<Sample>> {
        self.ensure_running()?;
        Ok(self.memtable.latest())
    }

    /// Up to `limit` most recent samples, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<Sample>> {
        self.ensure_running()?;
        Ok(self.memtable.recent(limit))
    }

    /// Number of stored samples
    pub fn count(&self) -> Result<usize> {
        self.ensure_running()?;
        Ok(self.memtable.len())
    }

    /// Force sync WAL to disk
    pub fn sync(&self) -> Result<()> {
        self.wal.sync()
    }

    /// Shutdown the storage engine. Later reads and writes fail with `ShutDown`.
    pub fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!(data_dir = ?self.config.data_dir, "Shutting down storage engine");

        // Wait for any in-flight write before the final sync
        let _guard = self.write_lock.lock();
        self.sync()?;

        info!("Storage engine shutdown complete");
        Ok(())
    }

    /// Whether the engine still accepts reads and writes
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current store statistics
    pub fn stats(&self) -> StorageStats {
        let bounds = self.memtable.time_bounds();
        StorageStats {
            sample_count: self.memtable.len(),
            memory_bytes: self.memtable.size(),
            oldest_timestamp: bounds.map(|(oldest, _)| oldest),
            newest_timestamp: bounds.map(|(_, newest)| newest),
            wal_sequence: self.wal.sequence(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(StorageError::ShutDown)
        }
    }

    /// Replay the WAL into `memtable`, returning the next WAL sequence number
    fn recover(wal_dir: &Path, memtable: &MemTable) -> Result<u64> {
        let entries = WalReader::new(wal_dir).read_all()?;

        if entries.is_empty() {
            info!("No WAL entries to recover");
            return Ok(0);
        }

        info!("Recovering {} WAL entries", entries.len());

        let mut next_sequence = 0;
        let mut last_written: Option<Timestamp> = None;
        for entry in &entries {
            memtable.insert_batch(&entry.samples);
            next_sequence = next_sequence.max(entry.sequence + 1);
            last_written = last_written.max(Some(entry.timestamp));
        }

        info!(
            last_written = ?last_written,
            "WAL recovery complete, {} samples recovered",
            memtable.len()
        );
        Ok(next_sequence)
    }
}
