//! Command implementations for the archive indexer.
//!
//! Handles:
//! - stats / cursors / records: Inspect an index database
//! - reset / compact: Maintenance
//! - load: Index a local directory as a snapshot source

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use walkdir::WalkDir;

use archive_indexing::{
    ArchiveIndexer, IndexerConfig, MemoryArchive, SyncOutcome, Table, TableSet,
};
use archive_storage::Storage;
use archive_types::Settings;

use crate::cli::{Cli, Commands, TableSpec};

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

/// Open storage at the configured path, creating parent directories.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let storage = Storage::open(&db_path).context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

/// Run one parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings.log_level)?;

    let storage = open_storage(&settings)?;

    match cli.command {
        Commands::Stats => show_stats(&storage),
        Commands::Cursors => show_cursors(&storage),
        Commands::Records {
            table,
            origin,
            limit,
        } => show_records(&storage, &table, origin.as_deref(), limit),
        Commands::Reset { tables } => reset_tables(&storage, tables),
        Commands::Compact { cf } => compact(&storage, cf.as_deref()),
        Commands::Load { dir, tables, url } => {
            let outcome = load_directory(storage, &settings, &dir, &tables, url).await?;
            print_outcome(&outcome);
            Ok(())
        }
    }
}

pub fn show_stats(storage: &Storage) -> Result<()> {
    let stats = storage.get_stats().context("Failed to read stats")?;
    println!("Database Statistics");
    println!("===================");
    println!("Sources:     {}", stats.source_count);
    println!("Records:     {}", stats.record_count);
    println!("Tables:      {}", stats.table_count);
    println!("Disk usage:  {} bytes", stats.disk_usage_bytes);
    Ok(())
}

pub fn show_cursors(storage: &Storage) -> Result<()> {
    let cursors = storage.list_index_meta().context("Failed to list cursors")?;
    if cursors.is_empty() {
        println!("No sources indexed");
        return Ok(());
    }
    for meta in cursors {
        println!(
            "{}  version={}  updated={}",
            meta.url,
            meta.version,
            meta.updated_at.to_rfc3339()
        );
    }
    Ok(())
}

pub fn show_records(
    storage: &Storage,
    table: &str,
    origin: Option<&str>,
    limit: usize,
) -> Result<()> {
    let records = match origin {
        Some(origin) => storage.list_records_by_origin(table, origin),
        None => storage.list_records(table),
    }
    .with_context(|| format!("Failed to list records of table '{}'", table))?;

    let total = records.len();
    for record in records.into_iter().take(limit) {
        println!("{}  {}", record.url, serde_json::to_string(&record.record)?);
    }
    if total > limit {
        println!("... {} more", total - limit);
    }
    Ok(())
}

/// Clear the named partitions, or every partition with a stored marker.
///
/// Stored schema markers are kept as they are.
pub fn reset_tables(storage: &Storage, tables: Vec<String>) -> Result<()> {
    let tables = if tables.is_empty() {
        storage
            .list_table_meta()
            .context("Failed to list tables")?
            .into_iter()
            .map(|m| m.name)
            .collect()
    } else {
        tables
    };

    let refs: Vec<&str> = tables.iter().map(String::as_str).collect();
    let (records, cursors) = storage
        .reset_tables(&refs, &[])
        .context("Failed to reset tables")?;
    println!(
        "Reset {} table(s): {} record(s) deleted, {} cursor(s) rewound",
        tables.len(),
        records,
        cursors
    );
    Ok(())
}

pub fn compact(storage: &Storage, cf: Option<&str>) -> Result<()> {
    match cf {
        Some(cf) => storage
            .compact_cf(cf)
            .with_context(|| format!("Failed to compact '{}'", cf))?,
        None => storage.compact().context("Failed to compact")?,
    }
    println!("Compaction complete");
    Ok(())
}

/// Build a [`TableSet`] from command line definitions.
pub fn build_tables(specs: &[TableSpec]) -> Result<TableSet> {
    let tables = specs
        .iter()
        .map(|spec| Table::new(&spec.name, &spec.pattern))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(TableSet::new(tables)?)
}

/// Read every file under `dir` into an in-memory archive, in path order.
pub fn snapshot_directory(dir: &Path, url: &str) -> Result<MemoryArchive> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let archive = MemoryArchive::new(url);
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .context("File outside snapshot directory")?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let bytes = fs::read(entry.path())
            .with_context(|| format!("Failed to read {:?}", entry.path()))?;
        archive.put_bytes(&path, bytes);
    }
    Ok(archive)
}

/// Index `dir` as a source, replacing the previous snapshot of it.
pub async fn load_directory(
    storage: Arc<Storage>,
    settings: &Settings,
    dir: &Path,
    specs: &[TableSpec],
    url: Option<String>,
) -> Result<SyncOutcome> {
    let url = match url {
        Some(url) => url,
        None => {
            let canonical = dir
                .canonicalize()
                .with_context(|| format!("Failed to resolve {:?}", dir))?;
            format!("file://{}", canonical.display())
        }
    };

    let tables = build_tables(specs)?;
    let archive = Arc::new(snapshot_directory(dir, &url)?);
    info!(url = %url, version = archive.version(), "Snapshot loaded");

    let indexer = ArchiveIndexer::open(storage, tables, IndexerConfig::from(&settings.indexer))?;
    // Snapshot versions restart at 1 on every load
    indexer.remove_source(&url).await?;
    let result = indexer.add_source(archive, false).await;
    indexer.close();

    Ok(result?)
}

fn print_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Updated { from, to, applied } => {
            println!("Indexed versions {}..{}: {} change(s) applied", from, to, applied)
        }
        SyncOutcome::UpToDate { version } => println!("Up to date at version {}", version),
        SyncOutcome::Closed | SyncOutcome::Untracked => println!("Nothing indexed"),
    }
}
