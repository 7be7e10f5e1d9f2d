//! Per-source index cursors and per-table schema markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ArchiveIndexError;

/// Index progress for one source.
///
/// `version` is the highest archive version whose changes have been fully
/// applied. It is persisted after every applied change, never ahead of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Source identity
    pub url: String,

    /// Last fully-applied archive version
    pub version: u64,

    /// When the cursor last moved (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl IndexMeta {
    /// Create a cursor at version 0
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_version(url, 0)
    }

    pub fn with_version(url: impl Into<String>, version: u64) -> Self {
        Self {
            url: url.into(),
            version,
            updated_at: Utc::now(),
        }
    }

    /// Move the cursor to `version`
    pub fn advance(&mut self, version: u64) {
        self.version = version;
        self.updated_at = Utc::now();
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveIndexError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveIndexError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Schema marker stored for each table.
///
/// A mismatch between the stored and the declared `schema_version` means
/// previously derived records are outdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub schema_version: u32,
}

impl TableMeta {
    pub fn new(name: impl Into<String>, schema_version: u32) -> Self {
        Self {
            name: name.into(),
            schema_version,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveIndexError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveIndexError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
