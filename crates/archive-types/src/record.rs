//! Derived table records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ArchiveIndexError;

/// A validated representation of one archive file, stored in a table partition.
///
/// Keyed by `url`, the file's fully-qualified URL (source identity + path).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Fully-qualified file URL
    pub url: String,

    /// Source identity the file came from
    pub origin: String,

    /// When the record was written (milliseconds since epoch)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub indexed_at: DateTime<Utc>,

    /// The (possibly preprocessed) record body
    pub record: Value,
}

impl Record {
    pub fn new(url: impl Into<String>, origin: impl Into<String>, record: Value) -> Self {
        Self {
            url: url.into(),
            origin: origin.into(),
            indexed_at: Utc::now(),
            record,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ArchiveIndexError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveIndexError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Build the fully-qualified URL of `path` inside the source `origin`.
///
/// Exactly one `/` separates the two parts.
pub fn record_url(origin: &str, path: &str) -> String {
    format!(
        "{}/{}",
        origin.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_url_joins_with_single_slash() {
        assert_eq!(record_url("mem://alice", "/posts/1.json"), "mem://alice/posts/1.json");
        assert_eq!(record_url("mem://alice/", "posts/1.json"), "mem://alice/posts/1.json");
        assert_eq!(record_url("mem://alice/", "/posts/1.json"), "mem://alice/posts/1.json");
    }

    #[test]
    fn test_record_roundtrip_keeps_body() {
        let record = Record::new(
            "mem://alice/posts/1.json",
            "mem://alice",
            json!({"title": "hello"}),
        );
        let decoded = Record::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.url, record.url);
        assert_eq!(decoded.origin, "mem://alice");
        assert_eq!(decoded.record, json!({"title": "hello"}));
    }
}
