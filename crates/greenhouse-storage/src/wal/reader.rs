//! WAL reader implementation

use super::{parse_wal_file_num, WalEntryHeader};
use crate::error::{Result, StorageError};
use greenhouse_core::Sample;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

/// Upper bound on a single entry payload; anything larger is a corrupt header
const MAX_ENTRY_LEN: u32 = 256 * 1024 * 1024;

/// WAL entry
#[derive(Debug, Clone)]
pub struct WalEntry {
    /// Entry sequence number
    pub sequence: u64,
    /// Wall-clock time the entry was written (ms)
    pub timestamp: i64,
    /// Samples in this entry
    pub samples: Vec<Sample>,
}

/// WAL reader for recovery
pub struct WalReader {
    dir: PathBuf,
}

impl WalReader {
    /// Create a new WAL reader
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Read all entries from all WAL files, ordered by sequence number
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        let mut entries = Vec::new();
        for file_path in self.list_wal_files()? {
            entries.extend(self.read_file(&file_path)?);
        }

        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    /// Read a single WAL file
    ///
    /// A truncated trailing entry is logged and skipped; a checksum mismatch
    /// is an error.
    pub fn read_file(&self, path: &Path) -> Result<Vec<WalEntry>> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();

        loop {
            let mut header_bytes = [0u8; WalEntryHeader::SIZE];
            match reader.read_exact(&mut header_bytes) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let header = WalEntryHeader::from_bytes(&header_bytes);
            if header.data_len > MAX_ENTRY_LEN {
                return Err(StorageError::WalCorrupted(format!(
                    "Entry length {} at sequence {} in {:?} exceeds limit",
                    header.data_len, header.sequence, path
                )));
            }

            let mut data = vec![0u8; header.data_len as usize];
            match reader.read_exact(&mut data) {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::warn!(
                        sequence = header.sequence,
                        file = ?path,
                        "Truncated WAL entry, ignoring tail"
                    );
                    break;
                }
                Err(e) => return Err(e.into()),
            }

            let computed = header.compute_checksum(&data);
            if computed != header.checksum {
                return Err(StorageError::WalCorrupted(format!(
                    "Checksum mismatch at sequence {}: expected {:x}, got {:x}",
                    header.sequence, header.checksum, computed
                )));
            }

            let samples: Vec<Sample> = bincode::deserialize(&data)?;
            if samples.len() != header.sample_count as usize {
                return Err(StorageError::WalCorrupted(format!(
                    "Sample count mismatch at sequence {}: header says {}, payload has {}",
                    header.sequence,
                    header.sample_count,
                    samples.len()
                )));
            }

            entries.push(WalEntry {
                sequence: header.sequence,
                timestamp: header.timestamp,
                samples,
            });
        }

        Ok(entries)
    }

    /// List all WAL files in file-number order
    pub fn list_wal_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<(u64, PathBuf)> = std::fs::read_dir(&self.dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let num = parse_wal_file_num(&e.file_name().to_string_lossy())?;
                Some((num, e.path()))
            })
            .collect();

        files.sort_by_key(|(num, _)| *num);
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::{WalDurability, WalWriter};
    use greenhouse_core::Channel;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_sample(ts: i64, value: f64) -> Sample {
        Sample::builder()
            .timestamp(ts)
            .value(Channel::Humidity, value)
            .build()
            .unwrap()
    }

    fn only_file(dir: &Path) -> PathBuf {
        let files = WalReader::new(dir).list_wal_files().unwrap();
        assert_eq!(files.len(), 1);
        files[0].clone()
    }

    #[test]
    fn test_wal_read_write_roundtrip() {
        let dir = TempDir::new().unwrap();

        let before = greenhouse_core::now_millis();
        let writer = WalWriter::new(dir.path(), WalDurability::EveryWrite).unwrap();
        for i in 0..10 {
            writer.write_sample(&create_test_sample(i * 1000, i as f64)).unwrap();
        }

        let entries = WalReader::new(dir.path()).read_all().unwrap();

        assert_eq!(entries.len(), 10);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64);
            // Write time, not the sample time
            assert!(entry.timestamp >= before);
            assert_eq!(entry.samples.len(), 1);
            assert_eq!(entry.samples[0].timestamp, i as i64 * 1000);
            assert_eq!(entry.samples[0].humidity, Some(i as f64));
        }
    }

    #[test]
    fn test_wal_read_empty() {
        let dir = TempDir::new().unwrap();
        assert!(WalReader::new(dir.path()).read_all().unwrap().is_empty());

        let missing = dir.path().join("does-not-exist");
        assert!(WalReader::new(&missing).read_all().unwrap().is_empty());
    }

    #[test]
    fn test_wal_multiple_files() {
        let dir = TempDir::new().unwrap();

        let writer = WalWriter::new(dir.path(), WalDurability::None)
            .unwrap()
            .with_max_file_size(512);
        for i in 0..50 {
            writer.write_sample(&create_test_sample(i * 1000, i as f64)).unwrap();
        }

        let reader = WalReader::new(dir.path());
        assert!(reader.list_wal_files().unwrap().len() > 1);

        let entries = reader.read_all().unwrap();
        assert_eq!(entries.len(), 50);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64);
        }
    }

    #[test]
    fn test_wal_truncated_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        {
            let writer = WalWriter::new(dir.path(), WalDurability::EveryWrite).unwrap();
            for i in 0..3 {
                writer.write_sample(&create_test_sample(i * 1000, i as f64)).unwrap();
            }
        }

        // Chop the last entry in half
        let path = only_file(dir.path());
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 10).unwrap();

        let entries = WalReader::new(dir.path()).read_all().unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_wal_checksum_mismatch_is_error() {
        let dir = TempDir::new().unwrap();
        {
            let writer = WalWriter::new(dir.path(), WalDurability::EveryWrite).unwrap();
            writer.write_sample(&create_test_sample(1000, 55.0)).unwrap();
        }

        // Flip a payload byte
        let path = only_file(dir.path());
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&bytes).unwrap();

        let result = WalReader::new(dir.path()).read_all();
        assert!(matches!(result, Err(StorageError::WalCorrupted(_))));
    }
}
