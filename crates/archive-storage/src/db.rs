//! RocksDB wrapper for archive indexer storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Cursor, record and table marker reads and writes
//! - Prefix sweeps over table partitions
//! - Atomic resets via WriteBatch

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use tracing::{debug, info};

use archive_types::{IndexMeta, Record, TableMeta};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_INDEX_META, CF_RECORDS, CF_TABLE_META,
};
use crate::error::StorageError;
use crate::keys::{MetaKey, RecordKey, TableKey};

/// Main storage interface for the archive indexer
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    /// Collect every (key, value) pair under `prefix` in key order
    fn scan_prefix(
        &self,
        cf: &ColumnFamily,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    // ==================== Index Meta ====================

    /// Persist a source cursor
    pub fn put_index_meta(&self, meta: &IndexMeta) -> Result<(), StorageError> {
        let cf = self.cf(CF_INDEX_META)?;
        let key = MetaKey::new(&meta.url);
        self.db.put_cf(cf, key.to_bytes(), meta.to_bytes()?)?;
        debug!(url = %meta.url, version = meta.version, "Stored index meta");
        Ok(())
    }

    /// Get a source cursor
    pub fn get_index_meta(&self, url: &str) -> Result<Option<IndexMeta>, StorageError> {
        let cf = self.cf(CF_INDEX_META)?;
        match self.db.get_cf(cf, MetaKey::new(url).to_bytes())? {
            Some(bytes) => Ok(Some(IndexMeta::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a source cursor
    pub fn delete_index_meta(&self, url: &str) -> Result<(), StorageError> {
        let cf = self.cf(CF_INDEX_META)?;
        self.db.delete_cf(cf, MetaKey::new(url).to_bytes())?;
        debug!(url = %url, "Deleted index meta");
        Ok(())
    }

    /// List every stored cursor, ordered by source URL
    pub fn list_index_meta(&self) -> Result<Vec<IndexMeta>, StorageError> {
        let cf = self.cf(CF_INDEX_META)?;
        self.scan_prefix(cf, b"meta:")?
            .into_iter()
            .map(|(_, value)| IndexMeta::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    // ==================== Records ====================

    /// Write a record into a table partition, replacing any previous one
    pub fn put_record(&self, table: &str, record: &Record) -> Result<(), StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let key = RecordKey::new(table, &record.url);
        self.db.put_cf(cf, key.to_bytes(), record.to_bytes()?)?;
        Ok(())
    }

    /// Get a record from a table partition
    pub fn get_record(&self, table: &str, url: &str) -> Result<Option<Record>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        match self.db.get_cf(cf, RecordKey::new(table, url).to_bytes())? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a record. Returns whether a record existed.
    pub fn delete_record(&self, table: &str, url: &str) -> Result<bool, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let key = RecordKey::new(table, url).to_bytes();
        let existed = self.db.get_pinned_cf(cf, &key)?.is_some();
        if existed {
            self.db.delete_cf(cf, &key)?;
        }
        Ok(existed)
    }

    /// List every record in a table partition, ordered by URL
    pub fn list_records(&self, table: &str) -> Result<Vec<Record>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        self.scan_prefix(cf, &RecordKey::table_prefix(table))?
            .into_iter()
            .map(|(_, value)| Record::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    /// List records of one source in a table partition
    pub fn list_records_by_origin(
        &self,
        table: &str,
        origin: &str,
    ) -> Result<Vec<Record>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut records = Vec::new();
        for (_, value) in self.scan_prefix(cf, &RecordKey::origin_prefix(table, origin))? {
            let record = Record::from_bytes(&value)?;
            if record.origin == origin {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Delete every record of one source from a table partition.
    ///
    /// Returns the URLs of deleted records.
    pub fn delete_records_by_origin(
        &self,
        table: &str,
        origin: &str,
    ) -> Result<Vec<String>, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        let mut batch = WriteBatch::default();
        let mut deleted = Vec::new();

        for (key, value) in self.scan_prefix(cf, &RecordKey::origin_prefix(table, origin))? {
            let record = Record::from_bytes(&value)?;
            if record.origin != origin {
                continue;
            }
            batch.delete_cf(cf, &key);
            deleted.push(record.url);
        }

        if !deleted.is_empty() {
            self.db.write(batch)?;
            debug!(table = %table, origin = %origin, count = deleted.len(), "Deleted records by origin");
        }

        Ok(deleted)
    }

    /// Count records in a table partition
    pub fn count_records(&self, table: &str) -> Result<u64, StorageError> {
        let cf = self.cf(CF_RECORDS)?;
        Ok(self.scan_prefix(cf, &RecordKey::table_prefix(table))?.len() as u64)
    }

    // ==================== Table Meta ====================

    /// Get the stored schema marker for a table
    pub fn get_table_meta(&self, name: &str) -> Result<Option<TableMeta>, StorageError> {
        let cf = self.cf(CF_TABLE_META)?;
        match self.db.get_cf(cf, TableKey::new(name).to_bytes())? {
            Some(bytes) => Ok(Some(TableMeta::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Store the schema marker for a table
    pub fn put_table_meta(&self, meta: &TableMeta) -> Result<(), StorageError> {
        let cf = self.cf(CF_TABLE_META)?;
        self.db
            .put_cf(cf, TableKey::new(&meta.name).to_bytes(), meta.to_bytes()?)?;
        Ok(())
    }

    /// List every stored table marker
    pub fn list_table_meta(&self) -> Result<Vec<TableMeta>, StorageError> {
        let cf = self.cf(CF_TABLE_META)?;
        self.scan_prefix(cf, b"table:")?
            .into_iter()
            .map(|(_, value)| TableMeta::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    // ==================== Resets ====================

    /// Clear table partitions and rewind every cursor to 0 in one atomic write.
    ///
    /// `markers` are written in the same batch so a crash never leaves
    /// new schema markers next to stale records.
    /// Returns (records deleted, cursors reset).
    pub fn reset_tables(
        &self,
        tables: &[&str],
        markers: &[TableMeta],
    ) -> Result<(usize, usize), StorageError> {
        let records_cf = self.cf(CF_RECORDS)?;
        let meta_cf = self.cf(CF_INDEX_META)?;
        let table_cf = self.cf(CF_TABLE_META)?;

        let mut batch = WriteBatch::default();
        let mut records_deleted = 0;

        for table in tables {
            for (key, _) in self.scan_prefix(records_cf, &RecordKey::table_prefix(table))? {
                batch.delete_cf(records_cf, &key);
                records_deleted += 1;
            }
        }

        let mut cursors_reset = 0;
        for (key, value) in self.scan_prefix(meta_cf, b"meta:")? {
            let mut meta = IndexMeta::from_bytes(&value)?;
            meta.advance(0);
            batch.put_cf(meta_cf, &key, meta.to_bytes()?);
            cursors_reset += 1;
        }

        for marker in markers {
            batch.put_cf(table_cf, TableKey::new(&marker.name).to_bytes(), marker.to_bytes()?);
        }

        self.db.write(batch)?;
        info!(
            tables = ?tables,
            records_deleted = records_deleted,
            cursors_reset = cursors_reset,
            "Reset table partitions"
        );

        Ok((records_deleted, cursors_reset))
    }

    // ===== Admin Operations =====

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Trigger compaction on a specific column family.
    pub fn compact_cf(&self, cf_name: &str) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        info!(cf = %cf_name, "Starting compaction...");
        self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
        info!(cf = %cf_name, "Compaction complete");
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats {
            source_count: self.count_cf_entries(self.cf(CF_INDEX_META)?)?,
            record_count: self.count_cf_entries(self.cf(CF_RECORDS)?)?,
            table_count: self.count_cf_entries(self.cf(CF_TABLE_META)?)?,
            ..Default::default()
        };
        stats.disk_usage_bytes = self.get_disk_usage();
        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of tracked source cursors
    pub source_count: u64,
    /// Number of records across all tables
    pub record_count: u64,
    /// Number of tables with a stored schema marker
    pub table_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}
