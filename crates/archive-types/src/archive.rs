//! Values exchanged with archive implementations.

use serde::{Deserialize, Serialize};

/// Current metadata of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Current (latest) version
    pub version: u64,
    /// Whether the local process can write to the archive
    pub is_owner: bool,
}

/// Live change notification from an archive watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    /// Remote content for `path` is available but not yet local
    Invalidated { path: String },
    /// Content for `path` changed and is readable
    Changed { path: String },
}

impl WatchEvent {
    pub fn path(&self) -> &str {
        match self {
            WatchEvent::Invalidated { path } | WatchEvent::Changed { path } => path,
        }
    }
}
