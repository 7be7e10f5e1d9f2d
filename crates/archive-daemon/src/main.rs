//! Archive Indexer
//!
//! Inspect and maintain an index database built from versioned archives.
//!
//! # Usage
//!
//! ```bash
//! archive-indexer stats
//! archive-indexer cursors
//! archive-indexer records --table posts [--origin URL]
//! archive-indexer reset [--table posts]...
//! archive-indexer compact [--cf records]
//! archive-indexer load ./site --table posts=/posts/*.json
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/archive-indexer/config.toml)
//! 3. Environment variables (ARCHIVE_INDEX_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use archive_daemon::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}
