//! One catch-up pass for a source.
//!
//! A pass moves through `Idle -> Locked -> Comparing -> Scanning -> Applying
//! -> Idle`. It ends early in `Aborted` when the indexer closes or the
//! source stops being tracked before the lock is taken, and in `Failed` when
//! scanning or applying errors. The source lock is released on every path.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use archive_types::{IndexEvent, VersionRange};

use crate::applier::UpdateApplier;
use crate::archive::Archive;
use crate::cursor::CursorStore;
use crate::error::IndexingError;
use crate::events::EventBus;
use crate::lock::SourceLocks;
use crate::scanner::scan_changes;
use crate::table::TableSet;

/// Where a source's most recent pass is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Locked,
    Comparing,
    Scanning,
    Applying,
    Aborted,
    Failed,
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The indexer is closed; nothing was done
    Closed,
    /// The source was removed before the pass could start
    Untracked,
    /// The cursor already covered the source version
    UpToDate { version: u64 },
    /// Changes between `from` and `to` were applied
    Updated { from: u64, to: u64, applied: usize },
}

impl SyncOutcome {
    /// Version the source is indexed at after the pass, if it ran.
    pub fn version(&self) -> Option<u64> {
        match self {
            SyncOutcome::Closed | SyncOutcome::Untracked => None,
            SyncOutcome::UpToDate { version } => Some(*version),
            SyncOutcome::Updated { to, .. } => Some(*to),
        }
    }
}

/// Runs locked synchronization passes over the tracked sources.
pub struct SourceSynchronizer {
    sources: DashMap<String, Arc<dyn Archive>>,
    locks: Arc<SourceLocks>,
    cursors: CursorStore,
    tables: Arc<TableSet>,
    applier: UpdateApplier,
    events: EventBus,
    shutdown: CancellationToken,
    states: DashMap<String, SyncState>,
}

impl SourceSynchronizer {
    pub fn new(
        locks: Arc<SourceLocks>,
        cursors: CursorStore,
        tables: Arc<TableSet>,
        applier: UpdateApplier,
        events: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sources: DashMap::new(),
            locks,
            cursors,
            tables,
            applier,
            events,
            shutdown,
            states: DashMap::new(),
        }
    }

    /// Start tracking `archive`. Returns `false` if its identity was already tracked.
    pub fn track(&self, archive: Arc<dyn Archive>) -> bool {
        self.sources
            .insert(archive.url().to_string(), archive)
            .is_none()
    }

    /// Stop tracking `url`; passes that have not taken the lock yet abort.
    pub fn untrack(&self, url: &str) -> Option<Arc<dyn Archive>> {
        self.sources.remove(url).map(|(_, archive)| archive)
    }

    pub fn source(&self, url: &str) -> Option<Arc<dyn Archive>> {
        self.sources.get(url).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_tracked(&self, url: &str) -> bool {
        self.sources.contains_key(url)
    }

    /// Tracked identities, sorted.
    pub fn tracked(&self) -> Vec<String> {
        let mut urls: Vec<_> = self.sources.iter().map(|e| e.key().clone()).collect();
        urls.sort();
        urls
    }

    fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    fn set_state(&self, url: &str, state: SyncState) {
        trace!(url = %url, state = ?state, "Sync state");
        self.states.insert(url.to_string(), state);
    }

    /// State of the latest pass for `url`.
    pub fn state(&self, url: &str) -> SyncState {
        self.states.get(url).map(|s| *s).unwrap_or_default()
    }

    /// Forget the state of a removed source.
    pub fn forget(&self, url: &str) {
        self.states.remove(url);
    }

    /// Bring the index for `archive` up to its current version.
    ///
    /// Waits for any pass already holding the source lock. Returns
    /// [`SyncOutcome::Closed`] without error once the indexer is closed and
    /// [`SyncOutcome::Untracked`] if the source was removed meanwhile.
    pub async fn sync(&self, archive: &dyn Archive) -> Result<SyncOutcome, IndexingError> {
        let url = archive.url();
        if self.is_closed() {
            return Ok(SyncOutcome::Closed);
        }

        let _guard = self.locks.acquire(url).await;
        if self.is_closed() {
            self.set_state(url, SyncState::Aborted);
            debug!(url = %url, "Indexer closed, skipping pass");
            return Ok(SyncOutcome::Closed);
        }
        if !self.is_tracked(url) {
            self.set_state(url, SyncState::Aborted);
            debug!(url = %url, "Source no longer tracked, skipping pass");
            return Ok(SyncOutcome::Untracked);
        }
        self.set_state(url, SyncState::Locked);

        let result = self.run_pass(archive).await;
        match &result {
            Ok(_) => self.set_state(url, SyncState::Idle),
            Err(_) => self.set_state(url, SyncState::Failed),
        }
        result
    }

    async fn run_pass(&self, archive: &dyn Archive) -> Result<SyncOutcome, IndexingError> {
        let url = archive.url();

        self.set_state(url, SyncState::Comparing);
        let (stored, info) = tokio::join!(async { self.cursors.find(url) }, archive.get_info());
        let stored = stored?;
        let info = info?;
        let cursor = match stored {
            Some(meta) => meta.version,
            None => self.cursors.advance(url, 0)?.version,
        };

        if cursor >= info.version {
            debug!(url = %url, version = cursor, "Source up to date");
            self.events.emit(IndexEvent::SourceIndexed {
                url: url.to_string(),
                version: cursor,
            });
            return Ok(SyncOutcome::UpToDate { version: cursor });
        }

        self.set_state(url, SyncState::Scanning);
        let range = VersionRange::after(cursor, info.version);
        let changes = scan_changes(archive, range, &self.tables).await?;

        self.set_state(url, SyncState::Applying);
        let result = self.applier.apply(archive, &changes).await?;
        if result.last_version < info.version {
            self.cursors.advance(url, info.version)?;
        }

        info!(
            url = %url,
            from = cursor,
            to = info.version,
            applied = result.applied(),
            "Source synchronized"
        );

        self.events.emit(IndexEvent::SourceIndexed {
            url: url.to_string(),
            version: info.version,
        });
        self.events.emit(IndexEvent::IndexesUpdated {
            url: url.to_string(),
            version: info.version,
        });

        Ok(SyncOutcome::Updated {
            from: cursor,
            to: info.version,
            applied: result.applied(),
        })
    }
}
