mod cli;
mod collection;
mod commands;
mod config;
mod error;
mod exif_fields;
mod filter;
mod ingest;
mod metadata;
mod mirror;
mod processor;
mod store;
mod store_clients;
mod walker;
mod xmp;

use crate::cli::Cli;
use crate::config::AppConfig;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.project_root)
        .with_context(|| format!("loading configuration from {}", cli.project_root.display()))?;

    // Initialize env_logger based on config.log_level
    env_logger::Builder::new()
        .filter_level(config.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .init();

    info!("Starting photo-pipeline in {:?}", cli.project_root);

    let outcome = commands::run(cli.command, &config).await?;
    if !outcome.is_success() {
        log::warn!("{} item(s) failed", outcome.failures);
        return Ok(ExitCode::FAILURE);
    }

    info!("photo-pipeline finished");
    Ok(ExitCode::SUCCESS)
}
