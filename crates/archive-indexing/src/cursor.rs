//! Version cursor tracking for sources.
//!
//! Each source has one cursor: the highest archive version whose changes
//! are fully applied. Cursors enable crash recovery and resumable,
//! delta-only synchronization.

use std::sync::Arc;

use tracing::debug;

use archive_storage::Storage;
use archive_types::IndexMeta;

use crate::error::IndexingError;

/// Persistent store of per-source cursors.
#[derive(Clone)]
pub struct CursorStore {
    storage: Arc<Storage>,
}

impl CursorStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Load the cursor for `url`, defaulting to version 0 when none exists.
    pub fn get(&self, url: &str) -> Result<IndexMeta, IndexingError> {
        Ok(self
            .storage
            .get_index_meta(url)?
            .unwrap_or_else(|| IndexMeta::new(url)))
    }

    /// Load the cursor only if it was persisted.
    pub fn find(&self, url: &str) -> Result<Option<IndexMeta>, IndexingError> {
        Ok(self.storage.get_index_meta(url)?)
    }

    /// Persist `version` as the cursor for `url`.
    pub fn advance(&self, url: &str, version: u64) -> Result<IndexMeta, IndexingError> {
        let mut meta = self.get(url)?;
        meta.advance(version);
        self.storage.put_index_meta(&meta)?;
        debug!(url = %url, version = version, "Advanced cursor");
        Ok(meta)
    }

    /// Remove the cursor for `url`.
    pub fn delete(&self, url: &str) -> Result<(), IndexingError> {
        self.storage.delete_index_meta(url)?;
        Ok(())
    }

    /// Every persisted cursor.
    pub fn list(&self) -> Result<Vec<IndexMeta>, IndexingError> {
        Ok(self.storage.list_index_meta()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_store() -> (CursorStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());
        (CursorStore::new(storage), temp_dir)
    }

    #[test]
    fn test_missing_cursor_defaults_to_zero() {
        let (store, _temp) = create_store();
        let meta = store.get("mem://alice").unwrap();
        assert_eq!(meta.version, 0);
        assert!(store.find("mem://alice").unwrap().is_none());
    }

    #[test]
    fn test_advance_persists() {
        let (store, _temp) = create_store();
        store.advance("mem://alice", 3).unwrap();
        store.advance("mem://alice", 8).unwrap();

        assert_eq!(store.get("mem://alice").unwrap().version, 8);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let (store, _temp) = create_store();
        store.advance("mem://alice", 3).unwrap();
        store.delete("mem://alice").unwrap();
        assert!(store.find("mem://alice").unwrap().is_none());
    }
}
