//! Error types for the indexing core.

use archive_storage::StorageError;
use archive_types::ArchiveIndexError;
use thiserror::Error;

/// Errors reported by an archive implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// The archive could not be reached (no peers, offline)
    #[error("Archive unreachable: {0}")]
    Unreachable(String),

    /// A history or read call timed out
    #[error("Archive timed out: {0}")]
    Timeout(String),

    /// The requested file or version does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other archive failure
    #[error("Archive error: {0}")]
    Other(String),
}

impl ArchiveError {
    /// Whether the failure means the archive is temporarily unavailable.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ArchiveError::Unreachable(_) | ArchiveError::Timeout(_))
    }
}

/// Errors that can occur while indexing
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Archive capability failed
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// File content is not valid structured data
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Invalid table definition
    #[error("Table error: {0}")]
    Table(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation on a source the indexer does not track
    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

impl IndexingError {
    /// Whether this failure is an unreachable/timeout classification.
    ///
    /// Only these failures start the recovery loop after an initial add.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, IndexingError::Archive(e) if e.is_unreachable())
    }
}

impl From<serde_json::Error> for IndexingError {
    fn from(err: serde_json::Error) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

impl From<ArchiveIndexError> for IndexingError {
    fn from(err: ArchiveIndexError) -> Self {
        IndexingError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexingError::Table("bad pattern".to_string());
        assert_eq!(err.to_string(), "Table error: bad pattern");

        let err = IndexingError::Parse {
            path: "/posts/1.json".to_string(),
            message: "expected value".to_string(),
        };
        assert_eq!(err.to_string(), "Parse error in /posts/1.json: expected value");

        let err = IndexingError::from(ArchiveError::Timeout("history".to_string()));
        assert_eq!(err.to_string(), "Archive timed out: history");
    }

    #[test]
    fn test_unreachable_classification() {
        assert!(IndexingError::from(ArchiveError::Unreachable("offline".into())).is_unreachable());
        assert!(IndexingError::from(ArchiveError::Timeout("read".into())).is_unreachable());
        assert!(!IndexingError::from(ArchiveError::NotFound("/a".into())).is_unreachable());
        assert!(!IndexingError::from(ArchiveError::Other("boom".into())).is_unreachable());
        assert!(!IndexingError::Table("x".into()).is_unreachable());
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: IndexingError = json_err.into();
        assert!(matches!(err, IndexingError::Serialization(_)));
    }
}
