//! Live change subscriptions.
//!
//! Watch state lives in a side table keyed by source identity. Each watched
//! source gets a listener task draining the archive's change stream and a
//! worker task running synchronization passes. Change events only set a
//! pending flag, so a burst of events collapses into at most one queued
//! pass behind the running one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use archive_types::WatchEvent;

use crate::archive::Archive;
use crate::error::IndexingError;
use crate::synchronizer::SourceSynchronizer;

struct WatchHandle {
    token: CancellationToken,
    _listener: JoinHandle<()>,
    _worker: JoinHandle<()>,
}

/// Attaches and detaches live watches.
pub struct WatchController {
    sync: Arc<SourceSynchronizer>,
    patterns: Vec<String>,
    shutdown: CancellationToken,
    watches: Mutex<HashMap<String, WatchHandle>>,
}

impl WatchController {
    /// `patterns` filters the change stream; empty subscribes to every path.
    pub fn new(
        sync: Arc<SourceSynchronizer>,
        patterns: Vec<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sync,
            patterns,
            shutdown,
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to `archive`'s changes.
    ///
    /// Returns `false` if the source is untracked, already watched, or the
    /// indexer is closed. One pass is queued right away to pick up changes
    /// made before the subscription opened.
    pub async fn watch(&self, archive: Arc<dyn Archive>) -> Result<bool, IndexingError> {
        let url = archive.url().to_string();
        if self.is_watching(&url) || !self.accepts(&url) {
            return Ok(false);
        }

        let stream = archive.watch(&self.patterns).await?;

        // Removal may have raced the subscription
        let mut watches = self.watches.lock().unwrap();
        if watches.contains_key(&url) || !self.accepts(&url) {
            return Ok(false);
        }

        let token = self.shutdown.child_token();
        let pending = Arc::new(Notify::new());
        pending.notify_one();

        let listener = tokio::spawn(listen(
            archive.clone(),
            stream,
            pending.clone(),
            token.clone(),
        ));
        let worker = tokio::spawn(run_worker(
            self.sync.clone(),
            archive,
            pending,
            token.clone(),
        ));

        watches.insert(
            url.clone(),
            WatchHandle {
                token,
                _listener: listener,
                _worker: worker,
            },
        );
        info!(url = %url, "Watch attached");
        Ok(true)
    }

    /// Detach the watch for `url`. Returns `false` if it was not watched.
    ///
    /// A pass already running finishes; no new pass starts.
    pub fn unwatch(&self, url: &str) -> bool {
        let handle = self.watches.lock().unwrap().remove(url);
        match handle {
            Some(handle) => {
                handle.token.cancel();
                info!(url = %url, "Watch detached");
                true
            }
            None => false,
        }
    }

    /// Detach every watch.
    pub fn unwatch_all(&self) {
        let handles: Vec<_> = self.watches.lock().unwrap().drain().collect();
        for (url, handle) in handles {
            handle.token.cancel();
            debug!(url = %url, "Watch detached");
        }
    }

    fn accepts(&self, url: &str) -> bool {
        !self.shutdown.is_cancelled() && self.sync.is_tracked(url)
    }

    pub fn is_watching(&self, url: &str) -> bool {
        self.watches.lock().unwrap().contains_key(url)
    }

    /// Identities of watched sources.
    pub fn watched(&self) -> Vec<String> {
        let mut urls: Vec<_> = self.watches.lock().unwrap().keys().cloned().collect();
        urls.sort();
        urls
    }
}

async fn listen(
    archive: Arc<dyn Archive>,
    mut stream: crate::archive::WatchStream,
    pending: Arc<Notify>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = stream.next() => match event {
                Some(WatchEvent::Invalidated { path }) => prefetch(archive.clone(), path),
                Some(WatchEvent::Changed { path }) => {
                    trace!(url = %archive.url(), path = %path, "Change observed");
                    pending.notify_one();
                }
                None => {
                    debug!(url = %archive.url(), "Change stream ended");
                    break;
                }
            }
        }
    }
}

/// Fire-and-forget download; failures are only logged.
fn prefetch(archive: Arc<dyn Archive>, path: String) {
    tokio::spawn(async move {
        if let Err(e) = archive.download(&path).await {
            debug!(url = %archive.url(), path = %path, error = %e, "Prefetch failed");
        }
    });
}

async fn run_worker(
    sync: Arc<SourceSynchronizer>,
    archive: Arc<dyn Archive>,
    pending: Arc<Notify>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = pending.notified() => {
                if let Err(e) = sync.sync(archive.as_ref()).await {
                    warn!(url = %archive.url(), error = %e, "Watch-triggered sync failed");
                }
            }
        }
    }
}
