//! Command-line argument parsing for the Strata server.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Strata server command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "strata", about = "Strata voxel world server")]
pub struct CliArgs {
    /// Directory that holds column files.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Number of vertical section slots per column.
    #[arg(long)]
    pub column_sections: Option<usize>,

    /// Background save threads (0 = derive from CPU count).
    #[arg(long)]
    pub save_threads: Option<usize>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.data_dir {
            self.storage.data_dir = dir.clone();
        }
        if let Some(sections) = args.column_sections {
            self.storage.column_sections = sections;
        }
        if let Some(threads) = args.save_threads {
            self.storage.save_threads = threads;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
