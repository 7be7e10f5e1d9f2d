//! Archive capability trait and implementations.
//!
//! An archive is the mutable, versioned content source being indexed. The
//! indexer only consumes the capabilities below; storage and transport
//! belong to the implementation.

mod memory;

pub use memory::MemoryArchive;

use async_trait::async_trait;
use futures::stream::BoxStream;

use archive_types::{ArchiveInfo, ChangeEntry, VersionRange, WatchEvent};

use crate::error::ArchiveError;

/// Live change stream returned by [`Archive::watch`].
///
/// Dropping the stream closes the subscription.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Capabilities the indexer consumes from a source.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Stable identity of the source.
    fn url(&self) -> &str;

    /// Current version and ownership.
    async fn get_info(&self) -> Result<ArchiveInfo, ArchiveError>;

    /// Read a file, at a historical `version` when given, otherwise the latest.
    async fn read_file(&self, path: &str, version: Option<u64>) -> Result<Vec<u8>, ArchiveError>;

    /// Every history entry with a version inside `range`, in history order.
    async fn history(&self, range: VersionRange) -> Result<Vec<ChangeEntry>, ArchiveError>;

    /// Subscribe to live changes of paths matching `patterns`.
    ///
    /// An empty pattern list subscribes to every path.
    async fn watch(&self, patterns: &[String]) -> Result<WatchStream, ArchiveError>;

    /// Best-effort prefetch of remote content for `path`.
    async fn download(&self, path: &str) -> Result<(), ArchiveError>;
}
