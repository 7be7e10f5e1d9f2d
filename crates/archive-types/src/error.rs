//! Error types shared across the archive indexer.

use thiserror::Error;

/// Unified error type for shared type operations.
#[derive(Debug, Error)]
pub enum ArchiveIndexError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
