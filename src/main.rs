//! Conflux - dependency-aware plan orchestration
//!
//! CLI entry point.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::{debug, warn};

mod app;
mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    let config = app::loader::load_config(cli.config.as_deref())?;
    let _log_guard = app::logging::init_tracing(&config.logging)?;

    debug!("Starting Conflux v{}", env!("CARGO_PKG_VERSION"));
    if !std::path::Path::new(".env").exists() {
        debug!(".env file not found, using config files and environment only");
    }
    if config.workers.is_empty() {
        warn!("No workers configured; distributed runs will fail");
    }

    cli::run(cli, config).await
}
