//! vndb-sync — push a local game-collection export to a VNDB user list.
//!
//! Each local title is resolved to a canonical VNDB id with an
//! exact-then-fuzzy search chain, then its status, rating and completion
//! date are applied to the user's list through a rate-limited, retrying
//! client. Progress is persisted so an interrupted run resumes, and
//! anything that could not be resolved or uploaded lands in a durable
//! failure log for later retry.

#![warn(clippy::all)]

mod adapter;
mod cli;
mod config;
mod ratelimit;
mod record;
mod resolve;
mod retry;
mod shutdown;
mod sync;
mod types;
mod vndb;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ratelimit::RateLimiter;
use sync::{SyncConfig, SyncEngine};
use vndb::VndbClient;

/// File the list export is written to, next to the input data.
const LIST_EXPORT_FILE: &str = "vndb_list.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str())),
        )
        .init();

    let config = config::Config::load(Path::new(&cli.config), &cli)?;
    tracing::debug!(?config, "effective configuration");

    if !config.sync_local && !config.download_vndb {
        anyhow::bail!(
            "nothing to do: enable \"sync_local\" or \"download_vndb\" in the configuration"
        );
    }

    let token = config.require_token()?;
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit.max_requests,
        Duration::from_secs(config.rate_limit.window_secs),
    ));
    let client = Arc::new(VndbClient::over_http(
        token,
        config.proxy.as_deref(),
        limiter,
        retry::RetryConfig::default(),
    )?);

    let shutdown_token = shutdown::install_signal_handler();

    if config.sync_local {
        if !config.input_path.exists() {
            anyhow::bail!("input file not found: {}", config.input_path.display());
        }
        let records = adapter::read_records(&config.input_path, &config)?;

        let data_dir = config
            .input_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let engine = SyncEngine::new(
            client.clone(),
            SyncConfig {
                data_dir,
                concurrency: config.concurrency,
                skip_existing: config.skip_existing,
                dry_run: config.dry_run,
                no_progress_bar: config.no_progress_bar,
            },
        );
        let stats = engine.run(&records, shutdown_token.clone()).await?;

        println!("── Sync summary ──");
        println!("  Uploaded:       {}", stats.uploaded);
        println!("  Already listed: {}", stats.already_listed);
        println!("  Unresolved:     {}", stats.unresolved);
        println!("  Failed:         {}", stats.failed);
        println!("  Cursor:         {} of {}", stats.cursor, records.len());
        if stats.interrupted {
            println!("  Interrupted — rerun to resume from the cursor");
        }
        if stats.unresolved + stats.failed > 0 {
            println!(
                "  Failures recorded in {}",
                engine.failure_log_path().display()
            );
        }
    }

    if config.download_vndb && !shutdown_token.is_cancelled() {
        if config.dry_run {
            tracing::info!("[DRY RUN] skipping list download");
        } else {
            let output = config
                .input_path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .join(LIST_EXPORT_FILE);
            let count = sync::export_remote_list(&client, &output).await?;
            println!("Wrote {} list entries to {}", count, output.display());
        }
    }

    Ok(())
}
