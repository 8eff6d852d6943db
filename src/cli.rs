use clap::Parser;

use crate::types::LogLevel;

/// Command-line surface. The tool is meant to run with no arguments at all;
/// everything here only overrides what the config file and environment
/// already provide.
#[derive(Parser, Debug)]
#[command(
    name = "vndb-sync",
    about = "Sync a local game-collection export with a VNDB user list"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long, default_value = "config.json")]
    pub config: String,

    /// Collection export to sync (overrides the configured input path)
    #[arg(short = 'i', long)]
    pub input: Option<String>,

    /// VNDB API token.
    /// WARNING: passing via --token is visible in process listings.
    /// Prefer the VNDB_TOKEN environment variable instead.
    #[arg(long, env = "VNDB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Number of concurrent upload workers
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Resolve and report without writing anything to VNDB
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress_bar: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}
