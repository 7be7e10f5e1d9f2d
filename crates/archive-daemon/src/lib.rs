//! Archive indexer CLI library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations

pub mod cli;
pub mod commands;

pub use cli::{parse_table_spec, Cli, Commands, TableSpec};
pub use commands::{init_logging, load_directory, load_settings, open_storage, run};
