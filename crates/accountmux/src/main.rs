//! accountmux - manage OAuth accounts for mail, calendar and storage providers.

mod cli;
mod commands;

use accountmux_core::{AccountManager, Settings};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env().context("invalid accountmux settings")?;
    if let Some(path) = &cli.registry {
        settings.registry_path.clone_from(path);
    }
    init_logging(&settings, cli.verbose);
    debug!(registry = %settings.registry_path.display(), "loading accounts");

    let registry_path = settings.registry_path.clone();
    let manager = AccountManager::open(settings)
        .await
        .with_context(|| format!("failed to open {}", registry_path.display()))?;

    let result = commands::run(&manager, cli.command).await;
    manager.shutdown().await;
    result
}

/// Log to stderr. `RUST_LOG` wins; otherwise `-v` means debug, else `ACCOUNTMUX_LOG`.
fn init_logging(settings: &Settings, verbose: bool) {
    let fallback = if verbose {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
