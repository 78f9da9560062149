mod classifier;
mod commands;
mod config;
mod display;
mod error;
mod history;
mod log_entry;
mod types;
mod validation;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    // Load configuration
    let config = config::load_config(&cli)?;

    let level: LevelFilter = config.log_level.parse().map_err(|_| {
        error::ClassifyError::ConfigError(format!("Invalid log level: {}", config.log_level))
    })?;
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .context("Failed to initialise logger")?;

    info!("Starting classifier-history");
    if !cli.config.exists() {
        info!("No config file at {:?}, using defaults", cli.config);
    }

    // One store and one classifier per process, shared by reference
    let store = history::HistoryStore::open(&config.history_file, config.max_history_entries).await;
    let classifier = classifier::RemoteClassifier::new(&config)?;

    commands::execute_command(cli.command, &config, &store, &classifier).await
}
