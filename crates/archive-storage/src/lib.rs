//! Storage layer for the archive indexer.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for cursors, records and table markers
//! - Per-table record partitions addressed by key prefix
//! - Ordered prefix scans for partition and origin sweeps
//! - Atomic resets via WriteBatch

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{MetaKey, RecordKey, TableKey};
