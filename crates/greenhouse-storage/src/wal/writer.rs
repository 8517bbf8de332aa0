//! WAL writer implementation
//!
//! - Samples are serialized outside the file lock
//! - Group commit batches fsync calls in `Periodic` mode
//! - Each writer opens a fresh file, so a torn tail left by a crash is never
//!   appended to

use super::{parse_wal_file_num, wal_file_name, WalEntryHeader};
use crate::error::Result;
use greenhouse_core::{now_millis, Sample};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// WAL durability modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalDurability {
    /// fsync after every write (strongest durability, slowest)
    EveryWrite,
    /// fsync periodically (default: every 100ms)
    Periodic { interval_ms: u64 },
    /// Let the OS decide when to flush
    OsDefault,
    /// No fsync (fastest, accepts data loss risk)
    None,
}

impl Default for WalDurability {
    fn default() -> Self {
        WalDurability::Periodic { interval_ms: 100 }
    }
}

/// Default BufWriter capacity
const DEFAULT_BUFFER_CAPACITY: usize = 64 * 1024;

/// Default maximum WAL file size before rotation (64MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Group commit configuration
#[derive(Debug, Clone)]
pub struct GroupCommitConfig {
    /// Maximum pending bytes before forcing a sync
    pub max_pending_bytes: usize,
    /// Maximum pending entries before forcing a sync
    pub max_pending_entries: usize,
    /// Maximum wait time before forcing a sync
    pub max_wait_ms: u64,
}

impl Default for GroupCommitConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 1024 * 1024,
            max_pending_entries: 1000,
            max_wait_ms: 10,
        }
    }
}

/// Append-only WAL writer
pub struct WalWriter {
    dir: PathBuf,
    file: Mutex<BufWriter<File>>,
    /// Next sequence number to hand out
    sequence: AtomicU64,
    durability: WalDurability,
    last_sync: Mutex<Instant>,
    file_num: AtomicU64,
    max_file_size: u64,
    current_size: AtomicU64,
    /// Pending bytes since last sync (for group commit)
    pending_bytes: AtomicUsize,
    /// Pending entries since last sync (for group commit)
    pending_entries: AtomicUsize,
    group_commit: GroupCommitConfig,
}

impl WalWriter {
    /// Create a new WAL writer
    pub fn new(dir: impl AsRef<Path>, durability: WalDurability) -> Result<Self> {
        Self::with_config(dir, durability, GroupCommitConfig::default())
    }

    /// Create a new WAL writer with custom group commit configuration
    pub fn with_config(
        dir: impl AsRef<Path>,
        durability: WalDurability,
        group_commit: GroupCommitConfig,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let file_num = Self::find_next_file_num(&dir)?;
        let file = Self::open_file(&dir, file_num)?;

        Ok(Self {
            dir,
            file: Mutex::new(BufWriter::with_capacity(DEFAULT_BUFFER_CAPACITY, file)),
            sequence: AtomicU64::new(0),
            durability,
            last_sync: Mutex::new(Instant::now()),
            file_num: AtomicU64::new(file_num),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            current_size: AtomicU64::new(0),
            pending_bytes: AtomicUsize::new(0),
            pending_entries: AtomicUsize::new(0),
            group_commit,
        })
    }

    /// Set a custom max file size
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Continue numbering entries from `sequence` (used after recovery)
    pub fn with_start_sequence(self, sequence: u64) -> Self {
        self.sequence.store(sequence, Ordering::SeqCst);
        self
    }

    /// Write a batch of samples as one WAL entry, returning its sequence number
    pub fn write(&self, samples: &[Sample]) -> Result<u64> {
        if samples.is_empty() {
            return Ok(self.sequence.load(Ordering::SeqCst));
        }

        let data = bincode::serialize(samples)?;
        self.write_serialized(&data, samples.len() as u32)
    }

    /// Write a single sample
    pub fn write_sample(&self, sample: &Sample) -> Result<u64> {
        self.write(std::slice::from_ref(sample))
    }

    fn write_serialized(&self, data: &[u8], sample_count: u32) -> Result<u64> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        let mut header = WalEntryHeader {
            sequence,
            timestamp: now_millis(),
            sample_count,
            data_len: data.len() as u32,
            checksum: 0,
        };
        header.checksum = header.compute_checksum(data);

        let header_bytes = header.to_bytes();
        let entry_size = WalEntryHeader::SIZE + data.len();

        {
            let mut file = self.file.lock();
            file.write_all(&header_bytes)?;
            file.write_all(data)?;
        }

        let new_size = self
            .current_size
            .fetch_add(entry_size as u64, Ordering::Relaxed)
            + entry_size as u64;
        self.pending_bytes.fetch_add(entry_size, Ordering::Relaxed);
        self.pending_entries.fetch_add(1, Ordering::Relaxed);

        if new_size >= self.max_file_size {
            self.rotate()?;
        }

        self.maybe_sync_group_commit()?;

        Ok(sequence)
    }

    /// Force sync to disk
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_all()?;
        *self.last_sync.lock() = Instant::now();
        Ok(())
    }

    /// Next sequence number that will be assigned
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn rotate(&self) -> Result<()> {
        let new_file_num = self.file_num.fetch_add(1, Ordering::SeqCst) + 1;
        let new_file = Self::open_file(&self.dir, new_file_num)?;

        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().sync_all()?;
        *file = BufWriter::with_capacity(DEFAULT_BUFFER_CAPACITY, new_file);

        self.current_size.store(0, Ordering::SeqCst);
        self.pending_bytes.store(0, Ordering::Relaxed);
        self.pending_entries.store(0, Ordering::Relaxed);
        tracing::debug!(file_num = new_file_num, "Rotated WAL file");
        Ok(())
    }

    /// `EveryWrite` always syncs immediately; group commit only applies to `Periodic`.
    fn maybe_sync_group_commit(&self) -> Result<()> {
        match self.durability {
            WalDurability::EveryWrite => {
                self.sync()?;
                self.reset_pending();
            }
            WalDurability::Periodic { interval_ms } => {
                let pending_bytes = self.pending_bytes.load(Ordering::Relaxed);
                let pending_entries = self.pending_entries.load(Ordering::Relaxed);
                let last_sync = *self.last_sync.lock();
                let max_wait = Duration::from_millis(interval_ms.min(self.group_commit.max_wait_ms));

                if pending_bytes >= self.group_commit.max_pending_bytes
                    || pending_entries >= self.group_commit.max_pending_entries
                    || last_sync.elapsed() >= max_wait
                {
                    self.sync()?;
                    self.reset_pending();
                } else {
                    // Below every threshold: reach the OS now, fsync on a later write
                    self.file.lock().flush()?;
                }
            }
            WalDurability::OsDefault | WalDurability::None => {
                // Hand the buffer to the OS so readers can see it, no fsync
                self.file.lock().flush()?;
            }
        }
        Ok(())
    }

    fn reset_pending(&self) {
        self.pending_bytes.store(0, Ordering::Relaxed);
        self.pending_entries.store(0, Ordering::Relaxed);
    }

    fn open_file(dir: &Path, file_num: u64) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(wal_file_name(file_num)))?)
    }

    /// One past the highest existing file number, or 0 for an empty directory
    fn find_next_file_num(dir: &Path) -> Result<u64> {
        let mut next = 0u64;
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(num) = parse_wal_file_num(&entry.file_name().to_string_lossy()) {
                next = next.max(num + 1);
            }
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalReader;
    use greenhouse_core::Channel;
    use tempfile::TempDir;

    fn create_test_sample(ts: i64, value: f64) -> Sample {
        Sample::builder()
            .timestamp(ts)
            .value(Channel::Temperature, value)
            .build()
            .unwrap()
    }

    fn wal_files(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".log"))
            .count()
    }

    #[test]
    fn test_wal_write_single() {
        let dir = TempDir::new().unwrap();
        let wal = WalWriter::new(dir.path(), WalDurability::None).unwrap();

        let seq = wal.write_sample(&create_test_sample(1000, 21.0)).unwrap();

        assert_eq!(seq, 0);
        assert_eq!(wal.sequence(), 1);
    }

    #[test]
    fn test_wal_write_batch_is_one_entry() {
        let dir = TempDir::new().unwrap();
        let wal = WalWriter::new(dir.path(), WalDurability::None).unwrap();

        let samples: Vec<Sample> = (0..100)
            .map(|i| create_test_sample(i * 1000, i as f64))
            .collect();

        assert_eq!(wal.write(&samples).unwrap(), 0);
        assert_eq!(wal.sequence(), 1);
    }

    #[test]
    fn test_wal_empty_write() {
        let dir = TempDir::new().unwrap();
        let wal = WalWriter::new(dir.path(), WalDurability::None).unwrap();

        assert_eq!(wal.write(&[]).unwrap(), 0);
        assert_eq!(wal.sequence(), 0);
    }

    #[test]
    fn test_wal_durability_modes() {
        for durability in [
            WalDurability::None,
            WalDurability::OsDefault,
            WalDurability::Periodic { interval_ms: 10 },
            WalDurability::EveryWrite,
        ] {
            let dir = TempDir::new().unwrap();
            let wal = WalWriter::new(dir.path(), durability).unwrap();

            wal.write_sample(&create_test_sample(1000, 21.0)).unwrap();
            wal.sync().unwrap();
        }
    }

    #[test]
    fn test_wal_rotation() {
        let dir = TempDir::new().unwrap();
        let wal = WalWriter::new(dir.path(), WalDurability::None)
            .unwrap()
            .with_max_file_size(512);

        for i in 0..100 {
            wal.write_sample(&create_test_sample(i * 1000, i as f64)).unwrap();
        }

        assert!(wal_files(dir.path()) > 1, "Expected multiple WAL files after rotation");
    }

    #[test]
    fn test_wal_reopen_starts_new_file() {
        let dir = TempDir::new().unwrap();
        {
            let wal = WalWriter::new(dir.path(), WalDurability::None).unwrap();
            wal.write_sample(&create_test_sample(1000, 21.0)).unwrap();
        }

        let wal = WalWriter::new(dir.path(), WalDurability::None)
            .unwrap()
            .with_start_sequence(1);
        assert_eq!(wal.write_sample(&create_test_sample(2000, 22.0)).unwrap(), 1);
        assert_eq!(wal_files(dir.path()), 2);
    }

    #[test]
    fn test_wal_group_commit() {
        let dir = TempDir::new().unwrap();

        let config = GroupCommitConfig {
            max_pending_bytes: 1024 * 1024,
            max_pending_entries: 5,
            max_wait_ms: 10_000,
        };
        let wal = WalWriter::with_config(
            dir.path(),
            WalDurability::Periodic { interval_ms: 10_000 },
            config,
        )
        .unwrap();

        for i in 0..4 {
            wal.write_sample(&create_test_sample(i * 1000, i as f64)).unwrap();
        }
        assert_eq!(wal.pending_entries.load(Ordering::Relaxed), 4);

        // Fifth entry reaches the threshold
        wal.write_sample(&create_test_sample(4000, 4.0)).unwrap();
        assert_eq!(wal.pending_entries.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_wal_periodic_writes_below_threshold_reach_file() {
        let dir = TempDir::new().unwrap();

        let config = GroupCommitConfig {
            max_pending_bytes: 1024 * 1024,
            max_pending_entries: 1000,
            max_wait_ms: 10_000,
        };
        let wal = WalWriter::with_config(
            dir.path(),
            WalDurability::Periodic { interval_ms: 10_000 },
            config,
        )
        .unwrap();

        wal.write_sample(&create_test_sample(1000, 21.0)).unwrap();
        wal.write_sample(&create_test_sample(2000, 22.0)).unwrap();
        // Neither write crossed a sync threshold
        assert_eq!(wal.pending_entries.load(Ordering::Relaxed), 2);

        let entries = WalReader::new(dir.path()).read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].samples[0].timestamp, 1000);
        assert_eq!(entries[1].samples[0].timestamp, 2000);
    }
}
