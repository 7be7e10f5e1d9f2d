//! # archive-types
//!
//! Shared domain types for the archive indexer.
//!
//! This crate defines the data structures passed between the storage layer,
//! the indexing core and the daemon:
//! - Changes: Path-level history entries and version ranges
//! - Index meta: Per-source version cursors
//! - Records: Derived, validated table entries keyed by file URL
//! - Events: Lifecycle and per-table notifications
//! - Settings: Configuration types

pub mod archive;
pub mod change;
pub mod config;
pub mod error;
pub mod event;
pub mod meta;
pub mod record;

pub use archive::{ArchiveInfo, WatchEvent};
pub use change::{ChangeEntry, ChangeType, VersionRange};
pub use config::{IndexerSettings, Settings};
pub use error::ArchiveIndexError;
pub use event::IndexEvent;
pub use meta::{IndexMeta, TableMeta};
pub use record::{record_url, Record};
