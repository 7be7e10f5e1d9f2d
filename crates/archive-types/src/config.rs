//! Configuration loading for the archive indexer.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/archive-indexer/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ArchiveIndexError;

/// Tuning for the indexing core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSettings {
    /// Seconds between retries while an added source stays unreachable.
    #[serde(default = "default_retry_interval")]
    pub retry_interval_secs: u64,

    /// Capacity of the notification channel. Slow subscribers past this
    /// many buffered notifications lose the oldest ones.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Path patterns watched in addition to every table pattern.
    #[serde(default)]
    pub watch_patterns: Vec<String>,

    /// Reset tables whose schema version changed when the index opens.
    #[serde(default = "default_auto_reset")]
    pub auto_reset_outdated: bool,
}

fn default_retry_interval() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    1024
}

fn default_auto_reset() -> bool {
    true
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            retry_interval_secs: default_retry_interval(),
            event_capacity: default_event_capacity(),
            watch_patterns: Vec::new(),
            auto_reset_outdated: default_auto_reset(),
        }
    }
}

impl IndexerSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.retry_interval_secs == 0 {
            return Err("retry_interval_secs must be > 0".to_string());
        }
        if self.event_capacity == 0 {
            return Err("event_capacity must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Indexing core settings
    #[serde(default)]
    pub indexer: IndexerSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "archive-indexer")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            indexer: IndexerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/archive-indexer/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (ARCHIVE_INDEX_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ArchiveIndexError> {
        let config_dir = ProjectDirs::from("", "", "archive-indexer")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?
            .set_default("indexer.retry_interval_secs", default_retry_interval())
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?
            .set_default("indexer.event_capacity", default_event_capacity() as u64)
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?
            .set_default("indexer.auto_reset_outdated", default_auto_reset())
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: ARCHIVE_INDEX_DB_PATH, ARCHIVE_INDEX_INDEXER__RETRY_INTERVAL_SECS
        builder = builder.add_source(
            Environment::with_prefix("ARCHIVE_INDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ArchiveIndexError::Config(e.to_string()))?;

        settings
            .indexer
            .validate()
            .map_err(ArchiveIndexError::Config)?;

        Ok(settings)
    }

    /// Expand ~ in db_path to the user's home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(dirs) = directories::BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
