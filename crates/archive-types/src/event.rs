//! Notifications published by the indexer.
//!
//! Per-table notifications (`PutRecord`, `DelRecord`) are emitted on every
//! index mutation; the remaining variants describe source lifecycle.

use serde::{Deserialize, Serialize};

/// Indexer notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum IndexEvent {
    /// A record was written to `table`
    PutRecord {
        table: String,
        url: String,
        origin: String,
        version: Option<u64>,
    },
    /// A record was removed from `table`
    DelRecord {
        table: String,
        url: String,
        origin: String,
    },
    /// A synchronization pass finished with the source at `version`
    SourceIndexed { url: String, version: u64 },
    /// New changes were applied, moving the source to `version`
    IndexesUpdated { url: String, version: u64 },
    /// The initial synchronization could not reach the source
    SourceMissing { url: String },
    /// A previously missing source was synchronized
    SourceFound { url: String },
    /// The initial synchronization failed for a reason other than reachability
    SourceError { url: String, error: String },
}

impl IndexEvent {
    /// Short name of the notification.
    pub fn name(&self) -> &'static str {
        match self {
            IndexEvent::PutRecord { .. } => "put-record",
            IndexEvent::DelRecord { .. } => "del-record",
            IndexEvent::SourceIndexed { .. } => "source-indexed",
            IndexEvent::IndexesUpdated { .. } => "indexes-updated",
            IndexEvent::SourceMissing { .. } => "source-missing",
            IndexEvent::SourceFound { .. } => "source-found",
            IndexEvent::SourceError { .. } => "source-error",
        }
    }

    /// Whether this notification reports a record mutation.
    pub fn is_record_mutation(&self) -> bool {
        matches!(
            self,
            IndexEvent::PutRecord { .. } | IndexEvent::DelRecord { .. }
        )
    }
}
