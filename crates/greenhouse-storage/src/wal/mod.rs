//! Write-Ahead Log implementation
//!
//! Every accepted sample is appended to the WAL before it becomes visible to
//! scans. On start-up the engine replays the WAL to rebuild the memtable.

mod reader;
mod writer;

pub use reader::{WalEntry, WalReader};
pub use writer::{GroupCommitConfig, WalDurability, WalWriter, DEFAULT_MAX_FILE_SIZE};

/// WAL entry header
///
/// Layout (little-endian): sequence u64, timestamp i64, sample count u32,
/// data length u32, CRC32 u32, 4 bytes padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WalEntryHeader {
    /// Entry sequence number
    pub sequence: u64,
    /// Wall-clock time the entry was written (ms)
    pub timestamp: i64,
    /// Number of samples in this entry
    pub sample_count: u32,
    /// Length of the serialized data
    pub data_len: u32,
    /// CRC32 of header bytes 0-23 and data
    pub checksum: u32,
}

impl WalEntryHeader {
    pub const SIZE: usize = 32;
    /// Bytes of the header covered by the checksum (everything before it)
    pub const CHECKSUMMED_LEN: usize = 24;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..8].copy_from_slice(&self.sequence.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.sample_count.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.data_len.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut u64_buf = [0u8; 8];
        let mut u32_buf = [0u8; 4];

        u64_buf.copy_from_slice(&bytes[0..8]);
        let sequence = u64::from_le_bytes(u64_buf);
        u64_buf.copy_from_slice(&bytes[8..16]);
        let timestamp = i64::from_le_bytes(u64_buf);
        u32_buf.copy_from_slice(&bytes[16..20]);
        let sample_count = u32::from_le_bytes(u32_buf);
        u32_buf.copy_from_slice(&bytes[20..24]);
        let data_len = u32::from_le_bytes(u32_buf);
        u32_buf.copy_from_slice(&bytes[24..28]);
        let checksum = u32::from_le_bytes(u32_buf);

        Self {
            sequence,
            timestamp,
            sample_count,
            data_len,
            checksum,
        }
    }

    /// Checksum over the header prefix and the payload
    pub fn compute_checksum(&self, data: &[u8]) -> u32 {
        let bytes = self.to_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&bytes[..Self::CHECKSUMMED_LEN]);
        hasher.update(data);
        hasher.finalize()
    }
}

/// Build the WAL file name for a file number
pub(crate) fn wal_file_name(num: u64) -> String {
    format!("wal_{:08}.log", num)
}

/// Parse a WAL file number out of a file name
pub(crate) fn parse_wal_file_num(name: &str) -> Option<u64> {
    name.strip_prefix("wal_")?
        .strip_suffix(".log")?
        .parse::<u64>()
        .ok()
}
