//! Per-source mutual exclusion.
//!
//! Every synchronization attempt on a source, whether triggered by a watch
//! event, a retry or a caller, holds the source's lock for its whole pass.
//! A contending pass waits for the holder and then observes the advanced
//! cursor. Different sources never share a lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// Named locks keyed by source identity.
#[derive(Default)]
pub struct SourceLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex(&self, url: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(url.to_string()).or_default().value())
    }

    /// Wait for exclusive access to `url`.
    pub async fn acquire(&self, url: &str) -> SourceGuard {
        let guard = self.mutex(url).lock_owned().await;
        trace!(url = %url, "Source lock acquired");
        SourceGuard {
            url: url.to_string(),
            _guard: guard,
        }
    }

    /// Whether a pass currently holds the lock for `url`.
    pub fn is_locked(&self, url: &str) -> bool {
        self.locks
            .get(url)
            .map_or(false, |mutex| mutex.try_lock().is_err())
    }

    /// Drop the lock entry for `url` if nobody holds or waits on it.
    pub fn remove_idle(&self, url: &str) {
        self.locks
            .remove_if(url, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// RAII guard releasing the source lock when dropped.
///
/// Release happens on every exit path of a pass, including errors.
pub struct SourceGuard {
    url: String,
    _guard: OwnedMutexGuard<()>,
}

impl SourceGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        trace!(url = %self.url, "Source lock released");
    }
}
