//! Per-file record derivation.
//!
//! Loads one archive file, parses it as JSON and projects it into every
//! table whose pattern matches the path. Valid content is stored under the
//! file's fully-qualified URL; invalid content removes any stored record.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use archive_storage::Storage;
use archive_types::{record_url, IndexEvent, Record};

use crate::archive::Archive;
use crate::error::IndexingError;
use crate::events::EventBus;
use crate::table::TableSet;

/// Outcome of indexing a single file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileResult {
    /// Tables the record was written to
    pub stored: usize,
    /// Tables the record was removed from
    pub removed: usize,
}

/// Writes and removes derived records for single files.
#[derive(Clone)]
pub struct RecordIndexer {
    storage: Arc<Storage>,
    tables: Arc<TableSet>,
    events: EventBus,
}

impl RecordIndexer {
    pub fn new(storage: Arc<Storage>, tables: Arc<TableSet>, events: EventBus) -> Self {
        Self {
            storage,
            tables,
            events,
        }
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    /// Load `path` at `version` (latest when `None`) and update every matching table.
    ///
    /// Read and parse failures are returned before anything is written.
    pub async fn index_file(
        &self,
        archive: &dyn Archive,
        path: &str,
        version: Option<u64>,
    ) -> Result<FileResult, IndexingError> {
        let origin = archive.url();
        let bytes = archive.read_file(path, version).await?;
        let content: Value =
            serde_json::from_slice(&bytes).map_err(|e| IndexingError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        let url = record_url(origin, path);
        let mut result = FileResult::default();

        for table in self.tables.matching(path) {
            let prepared = if table.validate(&content) {
                table.preprocess(content.clone())
            } else {
                None
            };

            match prepared {
                Some(body) => {
                    let record = Record::new(url.clone(), origin, body);
                    self.storage.put_record(table.name(), &record)?;
                    debug!(table = %table.name(), url = %url, version = ?version, "Stored record");
                    self.events.emit(IndexEvent::PutRecord {
                        table: table.name().to_string(),
                        url: url.clone(),
                        origin: origin.to_string(),
                        version,
                    });
                    result.stored += 1;
                }
                None => {
                    debug!(table = %table.name(), url = %url, "Record rejected by schema");
                    if self.storage.delete_record(table.name(), &url)? {
                        self.emit_del(table.name(), &url, origin);
                        result.removed += 1;
                    }
                }
            }
        }

        Ok(result)
    }

    /// Remove the record for `path` from every matching table.
    ///
    /// Storage failures are logged and skipped so teardown can continue.
    pub fn unindex_file(&self, origin: &str, path: &str) -> usize {
        let url = record_url(origin, path);
        let mut removed = 0;

        for table in self.tables.matching(path) {
            match self.storage.delete_record(table.name(), &url) {
                Ok(true) => {
                    debug!(table = %table.name(), url = %url, "Removed record");
                    self.emit_del(table.name(), &url, origin);
                    removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(table = %table.name(), url = %url, error = %e, "Failed to remove record");
                }
            }
        }

        removed
    }

    /// Remove every record whose origin is `origin` from every table.
    pub fn remove_origin(&self, origin: &str) -> Result<usize, IndexingError> {
        let mut removed = 0;
        for table in self.tables.iter() {
            let urls = self.storage.delete_records_by_origin(table.name(), origin)?;
            for url in &urls {
                self.emit_del(table.name(), url, origin);
            }
            removed += urls.len();
        }
        Ok(removed)
    }

    fn emit_del(&self, table: &str, url: &str, origin: &str) {
        self.events.emit(IndexEvent::DelRecord {
            table: table.to_string(),
            url: url.to_string(),
            origin: origin.to_string(),
        });
    }
}
