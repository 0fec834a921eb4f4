//! CLI entry point for rollcall.
//!
//! # Usage
//!
//! Run the capture loop with the simulated reader against the real endpoint:
//! ```bash
//! rollcall run --simulate --config config/rollcall.toml
//! ```
//!
//! Check that the endpoint answers:
//! ```bash
//! rollcall probe
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall::app::{self, RunOptions};
use rollcall::config::{RollcallConfig, DEFAULT_CONFIG_PATH};
use rollcall::error::AppError;
use rollcall::feedback::TracingSink;
use rollcall::{logging, restart};
use rollcall_core::UpdateGate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "RFID attendance capture with batched spreadsheet upload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture loop until Ctrl-C or a fatal condition
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Use the simulated card reader
        #[arg(long)]
        simulate: bool,

        /// Deliver to an in-process endpoint instead of the network
        #[arg(long)]
        offline: bool,

        /// Seed for the simulated reader
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Run one connectivity probe against the endpoint
    Probe {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Print the effective configuration as TOML
    CheckConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            simulate,
            offline,
            seed,
        } => {
            let options = RunOptions {
                simulate,
                offline,
                seed,
            };
            run(&config, options).await
        }
        Commands::Probe { config } => probe(&config).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn load_config(path: &Path) -> Result<RollcallConfig> {
    let config = RollcallConfig::load_from(path)
        .map_err(AppError::from)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate().map_err(AppError::Configuration)?;
    Ok(config)
}

async fn run(path: &Path, options: RunOptions) -> Result<()> {
    let config = load_config(path)?;
    logging::init_from_config(&config).map_err(AppError::Configuration)?;
    info!(
        device = %config.application.name,
        simulate = options.simulate,
        offline = options.offline,
        "starting"
    );

    let gate = UpdateGate::new();
    let mut coordinator = app::coordinator(&config, &options, gate)?;
    coordinator.start().await;

    tokio::select! {
        reason = coordinator.run() => {
            error!(%reason, "fatal condition");
            restart::restart(reason, config.coordinator.restart_delay()).await
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("shutdown requested");
            Ok(())
        }
    }
}

async fn probe(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    logging::init_from_config(&config).map_err(AppError::Configuration)?;

    let dispatcher = app::dispatcher(&config, false, Arc::new(TracingSink))?;
    dispatcher
        .probe()
        .await
        .map_err(AppError::from)
        .context("endpoint probe failed")?;
    info!(url = %config.endpoint.url, "endpoint reachable");
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let rendered = toml::to_string_pretty(&config).context("rendering configuration")?;
    println!("{}", rendered);
    Ok(())
}
