//! Retry loop for sources that were unreachable when added.
//!
//! Each retrying source owns a cancellable timer task keyed by its identity.
//! Tasks are children of the indexer's shutdown token, so closing the index
//! stops them all. Cancellation is checked after every wait and right
//! before each attempt, so a removed source never sees another retry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What an attempt decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// The source is back; stop retrying
    Done,
    /// Still unreachable; wait and try again
    Retry,
    /// Permanent failure or source gone; stop silently
    GiveUp,
}

struct RetryTask {
    id: u64,
    token: CancellationToken,
}

/// Registry of running retry loops.
pub struct RecoveryLoop {
    interval: Duration,
    shutdown: CancellationToken,
    tasks: Arc<Mutex<HashMap<String, RetryTask>>>,
    next_id: AtomicU64,
}

impl RecoveryLoop {
    pub fn new(interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            interval,
            shutdown,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start retrying `url`, replacing any loop already running for it.
    ///
    /// `attempt` runs once per interval until it returns something other
    /// than [`Attempt::Retry`] or the loop is cancelled.
    pub fn start<F, Fut>(&self, url: &str, mut attempt: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Attempt> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();

        if let Some(previous) = self.tasks.lock().unwrap().insert(
            url.to_string(),
            RetryTask {
                id,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let url = url.to_string();
        let interval = self.interval;
        let tasks = self.tasks.clone();

        info!(url = %url, interval_secs = interval.as_secs(), "Retry scheduled");
        tokio::spawn(async move {
            let mut retries = 0u32;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if token.is_cancelled() {
                    break;
                }

                retries += 1;
                match attempt().await {
                    Attempt::Retry => {
                        debug!(url = %url, retries = retries, "Source still unreachable");
                    }
                    Attempt::Done => {
                        info!(url = %url, retries = retries, "Recovery succeeded");
                        break;
                    }
                    Attempt::GiveUp => {
                        debug!(url = %url, retries = retries, "Recovery abandoned");
                        break;
                    }
                }
            }

            let mut tasks = tasks.lock().unwrap();
            if tasks.get(&url).map_or(false, |t| t.id == id) {
                tasks.remove(&url);
            }
        });
    }

    /// Stop retrying `url`. Returns whether a loop was running.
    pub fn cancel(&self, url: &str) -> bool {
        match self.tasks.lock().unwrap().remove(url) {
            Some(task) => {
                task.token.cancel();
                debug!(url = %url, "Retry cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop every loop.
    pub fn cancel_all(&self) {
        for (_, task) in self.tasks.lock().unwrap().drain() {
            task.token.cancel();
        }
    }

    pub fn is_retrying(&self, url: &str) -> bool {
        self.tasks.lock().unwrap().contains_key(url)
    }
}
