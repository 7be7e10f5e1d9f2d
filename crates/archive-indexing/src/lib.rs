//! Incremental, versioned indexing of archive content.
//!
//! This crate keeps per-table record partitions in sync with the history of
//! one or more mutable, versioned archives.
//!
//! ## Key Components
//!
//! - [`Archive`]: Capabilities consumed from a source, plus [`MemoryArchive`]
//! - [`Table`] / [`RecordSchema`]: Path pattern plus validate/preprocess hooks
//! - [`CursorStore`]: Per-source last fully-applied version
//! - [`scan_changes`]: Latest change per matching path over a version range
//! - [`RecordIndexer`]: Writes or removes the derived record for one file
//! - [`UpdateApplier`]: Applies changes in order, advancing the cursor per change
//! - [`SourceSynchronizer`]: One locked catch-up pass per source
//! - [`WatchController`]: Live change subscriptions triggering passes
//! - [`RecoveryLoop`]: Fixed-interval retries for unreachable sources
//! - [`ArchiveIndexer`]: Facade exposing the source lifecycle
//!
//! ## Example
//!
//! ```ignore
//! use archive_indexing::{ArchiveIndexer, IndexerConfig, MemoryArchive, Table, TableSet};
//!
//! let tables = TableSet::new(vec![Table::new("posts", "/posts/*.json")?])?;
//! let indexer = ArchiveIndexer::open(storage, tables, IndexerConfig::default())?;
//!
//! let archive = Arc::new(MemoryArchive::new("mem://alice"));
//! indexer.add_source(archive, true).await?;
//!
//! for record in indexer.list_records("posts")? {
//!     println!("{} -> {}", record.url, record.record);
//! }
//! ```

pub mod applier;
pub mod archive;
pub mod cursor;
pub mod error;
pub mod events;
pub mod indexer;
pub mod lock;
pub mod record_indexer;
pub mod recovery;
pub mod scanner;
pub mod synchronizer;
pub mod table;
pub mod watch;

pub use applier::{ApplyResult, UpdateApplier};
pub use archive::{Archive, MemoryArchive, WatchStream};
pub use cursor::CursorStore;
pub use error::{ArchiveError, IndexingError};
pub use events::EventBus;
pub use indexer::{ArchiveIndexer, IndexerConfig, ResetSummary};
pub use lock::{SourceGuard, SourceLocks};
pub use record_indexer::{FileResult, RecordIndexer};
pub use recovery::{Attempt, RecoveryLoop};
pub use scanner::{collapse_changes, scan_changes};
pub use synchronizer::{SourceSynchronizer, SyncOutcome, SyncState};
pub use table::{RecordSchema, RequiredFields, Table, TableSet};
pub use watch::WatchController;
