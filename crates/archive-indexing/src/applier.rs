//! Ordered application of scanned changes.
//!
//! Each change is applied and then the source cursor is persisted at that
//! change's version, so a crash or failure mid-batch leaves the cursor at
//! the last fully-applied change.

use tracing::{debug, warn};

use archive_types::ChangeEntry;

use crate::archive::Archive;
use crate::cursor::CursorStore;
use crate::error::IndexingError;
use crate::record_indexer::RecordIndexer;

/// Counters for one applied batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// Put changes indexed
    pub indexed: usize,
    /// Del changes removed
    pub removed: usize,
    /// Version of the last applied change, 0 if none
    pub last_version: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of changes applied.
    pub fn applied(&self) -> usize {
        self.indexed + self.removed
    }

    pub fn has_updates(&self) -> bool {
        self.applied() > 0
    }
}

/// Applies change lists for one source.
#[derive(Clone)]
pub struct UpdateApplier {
    indexer: RecordIndexer,
    cursors: CursorStore,
}

impl UpdateApplier {
    pub fn new(indexer: RecordIndexer, cursors: CursorStore) -> Self {
        Self { indexer, cursors }
    }

    /// Apply `changes` in order.
    ///
    /// A failed put aborts the batch: later entries are left untouched and
    /// the cursor stays at the last change that completed.
    pub async fn apply(
        &self,
        archive: &dyn Archive,
        changes: &[ChangeEntry],
    ) -> Result<ApplyResult, IndexingError> {
        let url = archive.url();
        let mut result = ApplyResult::new();

        for entry in changes {
            if entry.is_del() {
                self.indexer.unindex_file(url, &entry.path);
                result.removed += 1;
            } else {
                if let Err(e) = self
                    .indexer
                    .index_file(archive, &entry.path, Some(entry.version))
                    .await
                {
                    warn!(
                        url = %url,
                        path = %entry.path,
                        version = entry.version,
                        error = %e,
                        "Aborting batch"
                    );
                    return Err(e);
                }
                result.indexed += 1;
            }

            self.cursors.advance(url, entry.version)?;
            result.last_version = entry.version;
        }

        debug!(
            url = %url,
            indexed = result.indexed,
            removed = result.removed,
            last_version = result.last_version,
            "Applied changes"
        );

        Ok(result)
    }
}
