//! End-to-end test infrastructure for the archive indexer.
//!
//! Provides a shared TestHarness and helper functions for E2E tests
//! driving [`ArchiveIndexer`] against in-memory archives.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast::{error::TryRecvError, Receiver};

use archive_indexing::{ArchiveIndexer, IndexerConfig, MemoryArchive, RequiredFields, Table, TableSet};
use archive_storage::Storage;
use archive_types::IndexEvent;

/// Shared test harness for E2E tests.
///
/// Owns a temp directory, the storage opened in it and an indexer over the
/// default tables.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance
    pub storage: Arc<Storage>,
    /// Indexer under test
    pub indexer: ArchiveIndexer,
}

impl TestHarness {
    /// Create a harness indexing [`default_tables`].
    pub fn new() -> Self {
        Self::with_tables(default_tables(1))
    }

    pub fn with_tables(tables: TableSet) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        let indexer = ArchiveIndexer::open(storage.clone(), tables, IndexerConfig::default())
            .expect("Failed to open indexer");

        Self {
            _temp_dir: temp_dir,
            storage,
            indexer,
        }
    }

    /// Close the current indexer and open a new one over the same storage.
    pub fn reopen(&mut self, tables: TableSet) {
        self.indexer.close();
        self.indexer = ArchiveIndexer::open(self.storage.clone(), tables, IndexerConfig::default())
            .expect("Failed to reopen indexer");
    }

    /// Stored cursor version for `url`, if any.
    pub fn cursor(&self, url: &str) -> Option<u64> {
        self.indexer
            .index_meta(url)
            .expect("Failed to read cursor")
            .map(|meta| meta.version)
    }

    /// Stored record body for `path` of `origin` in `table`.
    pub fn record(&self, table: &str, origin: &str, path: &str) -> Option<Value> {
        self.indexer
            .get_record(table, &archive_types::record_url(origin, path))
            .expect("Failed to read record")
            .map(|record| record.record)
    }

    pub fn count(&self, table: &str) -> usize {
        self.indexer
            .list_records(table)
            .expect("Failed to list records")
            .len()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// `posts` (`/posts/*.json`, requires `title`) and `comments` (`/comments/*.json`).
pub fn default_tables(schema_version: u32) -> TableSet {
    TableSet::new(vec![
        Table::new("posts", "/posts/*.json")
            .expect("valid table")
            .with_schema(RequiredFields::new(["title"]))
            .with_schema_version(schema_version),
        Table::new("comments", "/comments/*.json")
            .expect("valid table")
            .with_schema_version(schema_version),
    ])
    .expect("valid table set")
}

/// An archive shared with the indexer.
pub fn archive(url: &str) -> Arc<MemoryArchive> {
    Arc::new(MemoryArchive::new(url))
}

/// Write `count` valid posts named `/posts/{i}.json`.
pub fn write_posts(archive: &MemoryArchive, count: usize) {
    for i in 0..count {
        archive.put_json(
            &format!("/posts/{}.json", i),
            &json!({ "title": format!("post {}", i) }),
        );
    }
}

/// Every notification currently buffered in `rx`.
pub fn drain_events(rx: &mut Receiver<IndexEvent>) -> Vec<IndexEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// Notification names, in order.
pub fn event_names(events: &[IndexEvent]) -> Vec<&'static str> {
    events.iter().map(IndexEvent::name).collect()
}

/// Number of record mutation notifications.
pub fn mutation_count(events: &[IndexEvent]) -> usize {
    events.iter().filter(|e| e.is_record_mutation()).count()
}

/// Wait until `rx` yields an event matching `predicate`, returning all events seen.
pub async fn wait_for<F>(rx: &mut Receiver<IndexEvent>, mut predicate: F) -> Vec<IndexEvent>
where
    F: FnMut(&IndexEvent) -> bool,
{
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = predicate(&event);
                    seen.push(event);
                    if done {
                        return;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("Event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("Timed out waiting for event");
    seen
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
