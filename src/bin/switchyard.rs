//! Command-line entry point for the switchyard control plane.
//!
//! Usage:
//!
//! ```text
//! switchyard --config <file> [--log-json] <command>
//! ```
//!
//! Commands:
//!
//! - `discover` scans the manifest directory and prints the registry.
//! - `sync` discovers servers and rewrites every configured client file.
//! - `serve` discovers and starts every server, keeps them alive, re-syncs
//!   client files whenever the registry changes, and stops every worker on
//!   Ctrl-C.
//!
//! Results are printed to stdout as JSON; logs go to stderr and are filtered
//! by `RUST_LOG` (default `switchyard=info`).

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Arc;
use switchyard::config::{ConfigError, ControlPlaneConfig};
use switchyard::control_plane::LocalControlPlane;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "switchyard=info";

#[derive(Debug, Parser)]
#[command(name = "switchyard", version, about = "Supervise tool servers and keep client configuration in step")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "switchyard.toml")]
    config: Utf8PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan for server manifests and print the registry.
    Discover,
    /// Discover servers and synchronise every client file.
    Sync,
    /// Run the control plane until interrupted.
    Serve,
}

/// Errors that end the process.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot write output: {0}")]
    Output(#[from] io::Error),
    #[error("cannot encode output: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Failed(String),
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn emit(value: &impl Serialize) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

async fn discover(plane: &LocalControlPlane, prune_missing: bool) -> Result<(), CliError> {
    let report = plane.discover(prune_missing).await;
    if report.success {
        Ok(())
    } else {
        Err(CliError::Failed(report.detail))
    }
}

async fn serve(plane: &LocalControlPlane, interval: std::time::Duration) -> Result<(), CliError> {
    let started = plane.start_all().await;
    info!(detail = %started.detail, "initial start finished");
    let shutdown = CancellationToken::new();
    let liveness = Arc::clone(plane.supervisor()).spawn_liveness_loop(shutdown.clone());

    let mut published = plane.registry().revision();
    let synced = plane.sync_all().await;
    info!(detail = %synced.detail, revision = published, "clients synchronised");

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "cannot listen for Ctrl-C; shutting down");
                }
                break;
            }
            _ = ticker.tick() => {
                let rediscovered = plane.discover(true).await;
                if !rediscovered.success {
                    warn!(detail = %rediscovered.detail, "rediscovery failed");
                }
                let revision = plane.registry().revision();
                if revision != published {
                    let resynced = plane.sync_all().await;
                    info!(detail = %resynced.detail, revision, "registry changed; clients re-synchronised");
                    published = revision;
                }
            }
        }
    }

    info!("shutting down");
    shutdown.cancel();
    if let Err(err) = liveness.await {
        warn!(error = %err, "liveness loop ended abnormally");
    }
    let stopped = plane.stop_all().await;
    emit(&stopped)
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = ControlPlaneConfig::load(&cli.config)?;
    let plane = LocalControlPlane::local(&config);

    match cli.command {
        Command::Discover => {
            discover(&plane, false).await?;
            emit(&plane.list_servers())
        }
        Command::Sync => {
            discover(&plane, false).await?;
            emit(&plane.sync_all().await)
        }
        Command::Serve => {
            discover(&plane, false).await?;
            serve(&plane, config.supervisor().heartbeat_interval()).await
        }
    }
}
