//! CLI argument parsing for the archive indexer.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Archive Indexer
///
/// Operates on an index database built from versioned archives.
#[derive(Parser, Debug)]
#[command(name = "archive-indexer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/archive-indexer/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// A `name=pattern` table definition given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub pattern: String,
}

/// Parse `name=pattern`.
pub fn parse_table_spec(value: &str) -> Result<TableSpec, String> {
    match value.split_once('=') {
        Some((name, pattern)) if !name.is_empty() && !pattern.is_empty() => Ok(TableSpec {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }),
        _ => Err(format!("expected NAME=PATTERN, got '{}'", value)),
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show database statistics
    Stats,

    /// List per-source version cursors
    Cursors,

    /// List records of a table
    Records {
        /// Table name
        #[arg(short, long)]
        table: String,

        /// Only records from this source
        #[arg(short, long)]
        origin: Option<String>,

        /// Maximum results
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Clear table partitions and rewind every cursor to 0
    Reset {
        /// Table to clear (repeatable; default: every table with a stored marker)
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },

    /// Trigger RocksDB compaction
    Compact {
        /// Compact only specific column family
        #[arg(long)]
        cf: Option<String>,
    },

    /// Index a local directory as a snapshot source
    ///
    /// Any previous snapshot of the same source is replaced.
    Load {
        /// Directory to index
        dir: PathBuf,

        /// Table definition as NAME=PATTERN (repeatable)
        #[arg(short, long = "table", value_parser = parse_table_spec, required = true)]
        tables: Vec<TableSpec>,

        /// Source identity (default: file://<canonical dir>)
        #[arg(long)]
        url: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_stats() {
        let cli = Cli::parse_from(["archive-indexer", "stats"]);
        assert!(matches!(cli.command, Commands::Stats));
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "archive-indexer",
            "--config",
            "/path/to/config.toml",
            "cursors",
            "--db-path",
            "/custom/db",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
        assert_eq!(cli.db_path, Some("/custom/db".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        assert!(matches!(cli.command, Commands::Cursors));
    }

    #[test]
    fn test_cli_records() {
        let cli = Cli::parse_from([
            "archive-indexer",
            "records",
            "--table",
            "posts",
            "--origin",
            "mem://alice",
        ]);
        match cli.command {
            Commands::Records {
                table,
                origin,
                limit,
            } => {
                assert_eq!(table, "posts");
                assert_eq!(origin, Some("mem://alice".to_string()));
                assert_eq!(limit, 50);
            }
            _ => panic!("Expected Records command"),
        }
    }

    #[test]
    fn test_cli_reset_multiple_tables() {
        let cli = Cli::parse_from(["archive-indexer", "reset", "-t", "posts", "-t", "comments"]);
        match cli.command {
            Commands::Reset { tables } => assert_eq!(tables, vec!["posts", "comments"]),
            _ => panic!("Expected Reset command"),
        }
    }

    #[test]
    fn test_cli_compact_cf() {
        let cli = Cli::parse_from(["archive-indexer", "compact", "--cf", "records"]);
        match cli.command {
            Commands::Compact { cf } => assert_eq!(cf, Some("records".to_string())),
            _ => panic!("Expected Compact command"),
        }
    }

    #[test]
    fn test_cli_load() {
        let cli = Cli::parse_from([
            "archive-indexer",
            "load",
            "./site",
            "--table",
            "posts=/posts/*.json",
        ]);
        match cli.command {
            Commands::Load { dir, tables, url } => {
                assert_eq!(dir, PathBuf::from("./site"));
                assert_eq!(
                    tables,
                    vec![TableSpec {
                        name: "posts".to_string(),
                        pattern: "/posts/*.json".to_string()
                    }]
                );
                assert!(url.is_none());
            }
            _ => panic!("Expected Load command"),
        }
    }

    #[test]
    fn test_load_requires_table() {
        assert!(Cli::try_parse_from(["archive-indexer", "load", "./site"]).is_err());
        assert!(Cli::try_parse_from(["archive-indexer", "load", "./site", "-t", "posts"]).is_err());
    }

    #[test]
    fn test_parse_table_spec() {
        assert_eq!(
            parse_table_spec("all=/**/*.json").unwrap(),
            TableSpec {
                name: "all".to_string(),
                pattern: "/**/*.json".to_string()
            }
        );
        assert!(parse_table_spec("=/x").is_err());
        assert!(parse_table_spec("name=").is_err());
    }
}
