//! The indexer facade.
//!
//! [`ArchiveIndexer`] wires storage, tables, locks, notifications, watches
//! and recovery together and exposes the source lifecycle operations.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use archive_storage::Storage;
use archive_types::{IndexEvent, IndexMeta, IndexerSettings, Record, TableMeta};

use crate::applier::UpdateApplier;
use crate::archive::Archive;
use crate::cursor::CursorStore;
use crate::error::IndexingError;
use crate::events::EventBus;
use crate::lock::{SourceGuard, SourceLocks};
use crate::record_indexer::RecordIndexer;
use crate::recovery::{Attempt, RecoveryLoop};
use crate::synchronizer::{SourceSynchronizer, SyncOutcome, SyncState};
use crate::table::TableSet;
use crate::watch::WatchController;

/// Runtime options for [`ArchiveIndexer`].
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Wait between retries of an unreachable source
    pub retry_interval: Duration,
    /// Notification buffer per subscriber
    pub event_capacity: usize,
    /// Patterns watched in addition to the table patterns
    pub watch_patterns: Vec<String>,
    /// Reset outdated tables when opening
    pub auto_reset_outdated: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self::from(&IndexerSettings::default())
    }
}

impl From<&IndexerSettings> for IndexerConfig {
    fn from(settings: &IndexerSettings) -> Self {
        Self {
            retry_interval: Duration::from_secs(settings.retry_interval_secs),
            event_capacity: settings.event_capacity,
            watch_patterns: settings.watch_patterns.clone(),
            auto_reset_outdated: settings.auto_reset_outdated,
        }
    }
}

impl IndexerConfig {
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_auto_reset(mut self, enabled: bool) -> Self {
        self.auto_reset_outdated = enabled;
        self
    }
}

/// Summary of a table reset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetSummary {
    pub tables: Vec<String>,
    pub records_deleted: usize,
    pub cursors_reset: usize,
}

struct Inner {
    storage: Arc<Storage>,
    tables: Arc<TableSet>,
    events: EventBus,
    cursors: CursorStore,
    records: RecordIndexer,
    locks: Arc<SourceLocks>,
    sync: Arc<SourceSynchronizer>,
    watches: WatchController,
    recovery: RecoveryLoop,
    shutdown: CancellationToken,
}

/// Incremental indexer over a set of archives.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ArchiveIndexer {
    inner: Arc<Inner>,
}

impl ArchiveIndexer {
    /// Build an indexer over `storage` for `tables`.
    ///
    /// With `auto_reset_outdated`, tables whose stored schema version differs
    /// from the declared one are cleared and every cursor rewinds to 0.
    pub fn open(
        storage: Arc<Storage>,
        tables: TableSet,
        config: IndexerConfig,
    ) -> Result<Self, IndexingError> {
        let tables = Arc::new(tables);
        let events = EventBus::new(config.event_capacity);
        let cursors = CursorStore::new(storage.clone());
        let records = RecordIndexer::new(storage.clone(), tables.clone(), events.clone());
        let locks = Arc::new(SourceLocks::new());
        let shutdown = CancellationToken::new();

        let sync = Arc::new(SourceSynchronizer::new(
            locks.clone(),
            cursors.clone(),
            tables.clone(),
            UpdateApplier::new(records.clone(), cursors.clone()),
            events.clone(),
            shutdown.clone(),
        ));

        let mut patterns = tables.patterns();
        patterns.extend(config.watch_patterns.iter().cloned());
        let watches = WatchController::new(sync.clone(), patterns, shutdown.clone());
        let recovery = RecoveryLoop::new(config.retry_interval, shutdown.clone());

        let indexer = Self {
            inner: Arc::new(Inner {
                storage,
                tables,
                events,
                cursors,
                records,
                locks,
                sync,
                watches,
                recovery,
                shutdown,
            }),
        };

        if config.auto_reset_outdated {
            let outdated = indexer.outdated_tables()?;
            if !outdated.is_empty() {
                // Nothing is tracked yet, so no pass can interleave
                indexer.reset_tables(&outdated)?;
            }
        }

        info!(tables = indexer.inner.tables.len(), "Indexer opened");
        Ok(indexer)
    }

    // ==================== Sources ====================

    /// Track `archive` and run its initial synchronization.
    ///
    /// An unreachable source emits `source-missing` and is retried every
    /// retry interval; any other failure emits `source-error`. In both
    /// cases the initial error is also returned. With `watch`, live
    /// changes are followed once the source has synchronized.
    pub async fn add_source(
        &self,
        archive: Arc<dyn Archive>,
        watch: bool,
    ) -> Result<SyncOutcome, IndexingError> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Ok(SyncOutcome::Closed);
        }

        let url = archive.url().to_string();
        if !inner.sync.track(archive.clone()) {
            debug!(url = %url, "Source already tracked");
        }
        info!(url = %url, watch = watch, "Adding source");

        match inner.sync.sync(archive.as_ref()).await {
            Ok(outcome) => {
                if watch && outcome.version().is_some() {
                    inner.watches.watch(archive).await?;
                }
                Ok(outcome)
            }
            Err(e) if e.is_unreachable() => {
                warn!(url = %url, error = %e, "Source unreachable, scheduling retries");
                inner.events.emit(IndexEvent::SourceMissing { url: url.clone() });
                self.start_recovery(archive, watch);
                Err(e)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Initial sync failed");
                inner.events.emit(IndexEvent::SourceError {
                    url,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn start_recovery(&self, archive: Arc<dyn Archive>, watch: bool) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let url = archive.url().to_string();

        self.inner.recovery.start(&url, move || {
            let weak = weak.clone();
            let archive = archive.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => inner.retry(archive, watch).await,
                    None => Attempt::GiveUp,
                }
            }
        });
    }

    /// Stop tracking `url` and delete everything derived from it.
    ///
    /// Future triggers stop immediately; a pass already running finishes
    /// before the records and the cursor are removed. Returns the number of
    /// records deleted.
    pub async fn remove_source(&self, url: &str) -> Result<usize, IndexingError> {
        let inner = &self.inner;
        if inner.is_closed() {
            return Ok(0);
        }

        inner.recovery.cancel(url);
        inner.watches.unwatch(url);
        inner.sync.untrack(url);

        let removed = {
            let _guard = inner.locks.acquire(url).await;
            // A pass that held the lock may have attached a watch
            inner.watches.unwatch(url);
            let removed = inner.records.remove_origin(url)?;
            inner.cursors.delete(url)?;
            removed
        };
        inner.sync.forget(url);
        inner.locks.remove_idle(url);

        info!(url = %url, records = removed, "Source removed");
        Ok(removed)
    }

    /// Follow live changes of a tracked source. Returns `false` if already watched.
    pub async fn watch(&self, url: &str) -> Result<bool, IndexingError> {
        if self.inner.is_closed() {
            return Ok(false);
        }
        let archive = self.inner.source(url)?;
        self.inner.watches.watch(archive).await
    }

    /// Stop following live changes. Unwatched sources are a no-op.
    pub fn unwatch(&self, url: &str) -> bool {
        self.inner.watches.unwatch(url)
    }

    /// Run a synchronization pass for a tracked source now.
    pub async fn sync_source(&self, url: &str) -> Result<SyncOutcome, IndexingError> {
        if self.inner.is_closed() {
            return Ok(SyncOutcome::Closed);
        }
        let archive = self.inner.source(url)?;
        self.inner.sync.sync(archive.as_ref()).await
    }

    // ==================== Tables ====================

    /// Tables whose stored schema version is missing or differs.
    pub fn outdated_tables(&self) -> Result<Vec<String>, IndexingError> {
        let mut outdated = Vec::new();
        for table in self.inner.tables.iter() {
            let stored = self.inner.storage.get_table_meta(table.name())?;
            if stored.map(|m| m.schema_version) != Some(table.schema_version()) {
                outdated.push(table.name().to_string());
            }
        }
        Ok(outdated)
    }

    /// Clear the named table partitions and rewind every cursor to 0.
    ///
    /// Waits for running passes on all tracked sources first; the next pass
    /// of each source rescans from version 1. A closed indexer resets nothing.
    pub async fn reset_outdated_indexes(
        &self,
        tables: &[String],
    ) -> Result<ResetSummary, IndexingError> {
        if self.inner.is_closed() {
            return Ok(ResetSummary::default());
        }

        let mut guards: Vec<SourceGuard> = Vec::new();
        for url in self.inner.sync.tracked() {
            guards.push(self.inner.locks.acquire(&url).await);
        }

        let summary = self.reset_tables(tables)?;
        drop(guards);
        Ok(summary)
    }

    /// Reset every table, whether outdated or not.
    pub async fn reset_all_indexes(&self) -> Result<ResetSummary, IndexingError> {
        let names: Vec<String> = self.inner.tables.names().into_iter().map(String::from).collect();
        self.reset_outdated_indexes(&names).await
    }

    fn reset_tables(&self, names: &[String]) -> Result<ResetSummary, IndexingError> {
        let mut markers = Vec::with_capacity(names.len());
        for name in names {
            let table = self
                .inner
                .tables
                .get(name)
                .ok_or_else(|| IndexingError::Table(format!("unknown table '{}'", name)))?;
            markers.push(TableMeta::new(table.name(), table.schema_version()));
        }

        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (records_deleted, cursors_reset) = self.inner.storage.reset_tables(&refs, &markers)?;

        info!(
            tables = ?names,
            records_deleted = records_deleted,
            cursors_reset = cursors_reset,
            "Reset outdated indexes"
        );

        Ok(ResetSummary {
            tables: names.to_vec(),
            records_deleted,
            cursors_reset,
        })
    }

    pub fn tables(&self) -> &TableSet {
        &self.inner.tables
    }

    // ==================== Records ====================

    pub fn get_record(&self, table: &str, url: &str) -> Result<Option<Record>, IndexingError> {
        self.inner.check_table(table)?;
        Ok(self.inner.storage.get_record(table, url)?)
    }

    pub fn list_records(&self, table: &str) -> Result<Vec<Record>, IndexingError> {
        self.inner.check_table(table)?;
        Ok(self.inner.storage.list_records(table)?)
    }

    pub fn list_records_by_origin(
        &self,
        table: &str,
        origin: &str,
    ) -> Result<Vec<Record>, IndexingError> {
        self.inner.check_table(table)?;
        Ok(self.inner.storage.list_records_by_origin(table, origin)?)
    }

    // ==================== Notifications ====================

    /// Receive notifications emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> EventBus {
        self.inner.events.clone()
    }

    // ==================== Status ====================

    pub fn is_watching(&self, url: &str) -> bool {
        self.inner.watches.is_watching(url)
    }

    /// Sources added in this session, sorted.
    pub fn tracked_sources(&self) -> Vec<String> {
        self.inner.sync.tracked()
    }

    pub fn index_meta(&self, url: &str) -> Result<Option<IndexMeta>, IndexingError> {
        self.inner.cursors.find(url)
    }

    /// Whether a pass currently holds the lock for `url`.
    pub fn is_syncing(&self, url: &str) -> bool {
        self.inner.locks.is_locked(url)
    }

    pub fn is_retrying(&self, url: &str) -> bool {
        self.inner.recovery.is_retrying(url)
    }

    pub fn sync_state(&self, url: &str) -> SyncState {
        self.inner.sync.state(url)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Stop all watches and retries. Later operations are silent no-ops.
    ///
    /// Running passes finish; passes waiting on a lock exit without work.
    pub fn close(&self) {
        let inner = &self.inner;
        if inner.is_closed() {
            return;
        }
        inner.shutdown.cancel();
        inner.recovery.cancel_all();
        inner.watches.unwatch_all();
        if let Err(e) = inner.storage.flush() {
            warn!(error = %e, "Flush on close failed");
        }
        info!("Indexer closed");
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn source(&self, url: &str) -> Result<Arc<dyn Archive>, IndexingError> {
        self.sync
            .source(url)
            .ok_or_else(|| IndexingError::UnknownSource(url.to_string()))
    }

    fn check_table(&self, table: &str) -> Result<(), IndexingError> {
        match self.tables.get(table) {
            Some(_) => Ok(()),
            None => Err(IndexingError::Table(format!("unknown table '{}'", table))),
        }
    }

    /// One recovery attempt for a source that was unreachable when added.
    async fn retry(&self, archive: Arc<dyn Archive>, watch: bool) -> Attempt {
        let url = archive.url().to_string();
        if self.is_closed() || !self.sync.is_tracked(&url) {
            return Attempt::GiveUp;
        }

        match self.sync.sync(archive.as_ref()).await {
            Ok(SyncOutcome::Closed) | Ok(SyncOutcome::Untracked) => Attempt::GiveUp,
            Ok(_) if !self.sync.is_tracked(&url) => {
                debug!(url = %url, "Source removed during retry");
                Attempt::GiveUp
            }
            Ok(_) => {
                self.events.emit(IndexEvent::SourceFound { url: url.clone() });
                if watch {
                    if let Err(e) = self.watches.watch(archive).await {
                        warn!(url = %url, error = %e, "Failed to attach watch after recovery");
                    }
                }
                Attempt::Done
            }
            Err(e) if e.is_unreachable() => Attempt::Retry,
            Err(e) => {
                debug!(url = %url, error = %e, "Retry failed permanently");
                Attempt::GiveUp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::table::Table;
    use serde_json::json;
    use tempfile::TempDir;

    fn tables(version: u32) -> TableSet {
        TableSet::new(vec![Table::new("docs", "/*.json")
            .unwrap()
            .with_schema_version(version)])
        .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_remove_source() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let indexer = ArchiveIndexer::open(storage, tables(1), IndexerConfig::default()).unwrap();

        let archive = Arc::new(MemoryArchive::new("mem://alice"));
        archive.put_json("/a.json", &json!({"n": 1}));

        let outcome = indexer.add_source(archive.clone(), false).await.unwrap();
        assert_eq!(outcome.version(), Some(1));
        assert_eq!(indexer.tracked_sources(), vec!["mem://alice".to_string()]);
        assert_eq!(indexer.sync_state("mem://alice"), SyncState::Idle);
        assert_eq!(indexer.tables().names(), vec!["docs"]);
        assert_eq!(indexer.list_records("docs").unwrap().len(), 1);

        assert_eq!(indexer.remove_source("mem://alice").await.unwrap(), 1);
        assert!(indexer.tracked_sources().is_empty());
        assert!(indexer.index_meta("mem://alice").unwrap().is_none());
        assert!(indexer.list_records("docs").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_source_and_table() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let indexer = ArchiveIndexer::open(storage, tables(1), IndexerConfig::default()).unwrap();

        assert!(matches!(
            indexer.sync_source("mem://nobody").await,
            Err(IndexingError::UnknownSource(_))
        ));
        assert!(matches!(indexer.list_records("nope"), Err(IndexingError::Table(_))));
        assert!(!indexer.unwatch("mem://nobody"));
    }

    #[tokio::test]
    async fn test_schema_version_change_resets_on_open() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let archive = Arc::new(MemoryArchive::new("mem://alice"));
        archive.put_json("/a.json", &json!({"n": 1}));

        let first = ArchiveIndexer::open(storage.clone(), tables(1), IndexerConfig::default()).unwrap();
        assert!(first.outdated_tables().unwrap().is_empty());
        first.add_source(archive.clone(), false).await.unwrap();
        first.close();

        let second = ArchiveIndexer::open(storage.clone(), tables(2), IndexerConfig::default()).unwrap();
        assert!(second.outdated_tables().unwrap().is_empty());
        assert!(second.list_records("docs").unwrap().is_empty());
        assert_eq!(second.index_meta("mem://alice").unwrap().unwrap().version, 0);
    }

    #[test]
    fn test_config_from_settings() {
        let settings = IndexerSettings {
            retry_interval_secs: 5,
            watch_patterns: vec!["/extra/*.json".to_string()],
            ..Default::default()
        };
        let config = IndexerConfig::from(&settings);
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.watch_patterns, vec!["/extra/*.json".to_string()]);

        let config = config
            .with_retry_interval(Duration::from_millis(10))
            .with_auto_reset(false);
        assert_eq!(config.retry_interval, Duration::from_millis(10));
        assert!(!config.auto_reset_outdated);
    }

    #[tokio::test]
    async fn test_outdated_tables_kept_without_auto_reset() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let config = IndexerConfig::default().with_auto_reset(false);
        let indexer = ArchiveIndexer::open(storage, tables(1), config).unwrap();
        assert_eq!(indexer.outdated_tables().unwrap(), vec!["docs".to_string()]);

        let summary = indexer.reset_outdated_indexes(&["docs".to_string()]).await.unwrap();
        assert_eq!(summary.tables, vec!["docs".to_string()]);
        assert!(indexer.outdated_tables().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listener_sees_lifecycle_events() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let indexer = ArchiveIndexer::open(storage, tables(1), IndexerConfig::default()).unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        indexer.events().add_listener("test", move |event| {
            sink.lock().unwrap().push(event.name());
        });

        let archive = Arc::new(MemoryArchive::new("mem://alice"));
        indexer.add_source(archive, false).await.unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*seen.lock().unwrap(), vec!["source-indexed"]);
    }

    #[tokio::test]
    async fn test_closed_indexer_is_silent() {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let indexer = ArchiveIndexer::open(storage, tables(1), IndexerConfig::default()).unwrap();
        indexer.close();

        let archive = Arc::new(MemoryArchive::new("mem://alice"));
        archive.put_json("/a.json", &json!({"n": 1}));
        assert_eq!(
            indexer.add_source(archive, true).await.unwrap(),
            SyncOutcome::Closed
        );
        assert_eq!(indexer.remove_source("mem://alice").await.unwrap(), 0);
        assert_eq!(indexer.reset_all_indexes().await.unwrap(), ResetSummary::default());
        assert!(indexer.is_closed());
    }
}
