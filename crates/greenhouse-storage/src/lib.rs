//! Greenhouse Storage - Durable measurement store
//!
//! This crate provides the storage layer:
//! - WAL (Write-Ahead Log) with configurable durability
//! - MemTable (timestamp-ordered in-memory index)
//! - Storage Engine (coordinator, recovery on start-up)
//! - `SampleSource` / `SampleSink` traits consumed by the query and ingest layers

pub mod engine;
pub mod error;
pub mod memtable;
pub mod source;
pub mod wal;

pub use engine::{StorageEngine, StorageEngineConfig, StorageStats};
pub use error::{Result, StorageError};
pub use memtable::MemTable;
pub use source::{SampleSink, SampleSource};
pub use wal::{WalDurability, WalReader, WalWriter};
