//! In-memory archive with full history.
//!
//! Useful for testing and for embedding the indexer without a transport.
//! Every write bumps the archive version by one, is appended to the history
//! log and is pushed to live watchers. Failures can be scripted to exercise
//! recovery and abort paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use globset::GlobSet;
use serde_json::Value;

use archive_types::change::normalize_path;
use archive_types::{ArchiveInfo, ChangeEntry, VersionRange, WatchEvent};

use super::{Archive, WatchStream};
use crate::error::ArchiveError;
use crate::table::build_glob_set;

struct Watcher {
    patterns: Option<GlobSet>,
    sender: UnboundedSender<WatchEvent>,
}

impl Watcher {
    fn wants(&self, path: &str) -> bool {
        self.patterns.as_ref().map_or(true, |set| set.is_match(path))
    }
}

#[derive(Default)]
struct MemoryState {
    version: u64,
    log: Vec<ChangeEntry>,
    /// Revisions per path; `None` marks a deletion
    revisions: HashMap<String, Vec<(u64, Option<Vec<u8>>)>>,
    watchers: Vec<Watcher>,
    unreachable_remaining: u32,
    next_failure: Option<ArchiveError>,
    failing_reads: HashSet<String>,
    downloads: Vec<String>,
    history_calls: usize,
    read_delay: Option<Duration>,
}

impl MemoryState {
    fn check_reachable(&mut self) -> Result<(), ArchiveError> {
        if self.unreachable_remaining > 0 {
            self.unreachable_remaining -= 1;
            return Err(ArchiveError::Unreachable("no peers available".to_string()));
        }
        Ok(())
    }

    fn notify(&mut self, event: WatchEvent) {
        self.watchers.retain(|w| !w.sender.is_closed());
        for watcher in &self.watchers {
            if watcher.wants(event.path()) {
                let _ = watcher.sender.unbounded_send(event.clone());
            }
        }
    }

    fn record(&mut self, path: String, content: Option<Vec<u8>>) -> u64 {
        self.version += 1;
        let version = self.version;
        let entry = match content {
            Some(_) => ChangeEntry::put(path.clone(), version),
            None => ChangeEntry::del(path.clone(), version),
        };
        self.log.push(entry);
        self.revisions
            .entry(path.clone())
            .or_default()
            .push((version, content));
        self.notify(WatchEvent::Changed { path });
        version
    }
}

/// Archive held entirely in memory.
pub struct MemoryArchive {
    url: String,
    is_owner: bool,
    state: Mutex<MemoryState>,
}

impl MemoryArchive {
    /// Create an empty, owned archive at version 0.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_owner: true,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Mark the archive as read-only for this process.
    pub fn read_only(mut self) -> Self {
        self.is_owner = false;
        self
    }

    /// Write a JSON document. Returns the new archive version.
    pub fn put_json(&self, path: &str, value: &Value) -> u64 {
        self.put_bytes(path, value.to_string().into_bytes())
    }

    /// Write raw bytes. Returns the new archive version.
    pub fn put_bytes(&self, path: &str, bytes: impl Into<Vec<u8>>) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.record(normalize_path(path.to_string()), Some(bytes.into()))
    }

    /// Delete a file. Returns the new archive version.
    pub fn delete(&self, path: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.record(normalize_path(path.to_string()), None)
    }

    /// Announce that remote content for `path` is available.
    pub fn invalidate(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        state.notify(WatchEvent::Invalidated {
            path: normalize_path(path.to_string()),
        });
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.state.lock().unwrap().version
    }

    /// Fail the next `times` capability calls as unreachable.
    pub fn fail_unreachable(&self, times: u32) {
        self.state.lock().unwrap().unreachable_remaining = times;
    }

    /// Fail the next `get_info` call with `error`.
    pub fn fail_next_info(&self, error: ArchiveError) {
        self.state.lock().unwrap().next_failure = Some(error);
    }

    /// Fail every read of `path`.
    pub fn fail_reads(&self, path: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_reads
            .insert(normalize_path(path.to_string()));
    }

    /// Delay every file read by `delay`, simulating a slow transport.
    pub fn set_read_delay(&self, delay: Duration) {
        self.state.lock().unwrap().read_delay = Some(delay);
    }

    /// Paths passed to `download`, in call order.
    pub fn downloads(&self) -> Vec<String> {
        self.state.lock().unwrap().downloads.clone()
    }

    /// Number of `history` calls served.
    pub fn history_calls(&self) -> usize {
        self.state.lock().unwrap().history_calls
    }

    /// Number of open watch subscriptions.
    pub fn watcher_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.watchers.retain(|w| !w.sender.is_closed());
        state.watchers.len()
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_info(&self) -> Result<ArchiveInfo, ArchiveError> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        if let Some(error) = state.next_failure.take() {
            return Err(error);
        }
        Ok(ArchiveInfo {
            version: state.version,
            is_owner: self.is_owner,
        })
    }

    async fn read_file(&self, path: &str, version: Option<u64>) -> Result<Vec<u8>, ArchiveError> {
        let delay = self.state.lock().unwrap().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;

        let path = normalize_path(path.to_string());
        if state.failing_reads.contains(&path) {
            return Err(ArchiveError::Other(format!("read failed: {}", path)));
        }

        let at = version.unwrap_or(state.version);
        state
            .revisions
            .get(&path)
            .and_then(|revs| revs.iter().rev().find(|(v, _)| *v <= at))
            .and_then(|(_, content)| content.clone())
            .ok_or_else(|| ArchiveError::NotFound(format!("{}@{}", path, at)))
    }

    async fn history(&self, range: VersionRange) -> Result<Vec<ChangeEntry>, ArchiveError> {
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.history_calls += 1;
        Ok(state
            .log
            .iter()
            .filter(|entry| range.contains(entry.version))
            .cloned()
            .collect())
    }

    async fn watch(&self, patterns: &[String]) -> Result<WatchStream, ArchiveError> {
        let patterns = if patterns.is_empty() {
            None
        } else {
            Some(build_glob_set(patterns).map_err(|e| ArchiveError::Other(e.to_string()))?)
        };

        let (sender, receiver) = unbounded();
        let mut state = self.state.lock().unwrap();
        state.check_reachable()?;
        state.watchers.push(Watcher { patterns, sender });
        Ok(receiver.boxed())
    }

    async fn download(&self, path: &str) -> Result<(), ArchiveError> {
        self.state
            .lock()
            .unwrap()
            .downloads
            .push(normalize_path(path.to_string()));
        Ok(())
    }
}
