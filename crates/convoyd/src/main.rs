//! convoyd — the convoy daemon.
//!
//! Single binary that assembles the convoy pieces:
//! - Storage backend (memory, JSON files or redb)
//! - Entity services
//! - Background deployment-count reconciler
//! - REST API
//!
//! # Usage
//!
//! ```text
//! convoyd serve --config convoy.toml --port 8000 --data-dir /var/lib/convoy
//! convoyd reconcile --config convoy.toml
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use convoy_core::{BackendKind, ConvoyConfig};
use convoy_services::Services;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,convoyd=debug,convoy=debug";

#[derive(Parser)]
#[command(name = "convoyd", about = "convoy daemon", version)]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Storage settings that may override the config file.
#[derive(clap::Args)]
struct StorageArgs {
    /// Path to convoy.toml; defaults apply if it does not exist.
    #[arg(long, default_value = "convoy.toml")]
    config: PathBuf,

    /// Directory holding the collections.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Storage backend: memory, json or redb.
    #[arg(long)]
    backend: Option<BackendKind>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the REST API and run the reconciler in the background.
    Serve {
        #[command(flatten)]
        storage: StorageArgs,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Recompute every derived deployment count once and exit.
    Reconcile {
        #[command(flatten)]
        storage: StorageArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve { storage, port } => {
            let config = load_config(&storage.config, port, storage.data_dir, storage.backend)?;
            run_serve(config).await
        }
        Command::Reconcile { storage } => {
            let config = load_config(&storage.config, None, storage.data_dir, storage.backend)?;
            run_reconcile(config)
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Read the config file and apply command-line overrides on top.
fn load_config(
    path: &Path,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    backend: Option<BackendKind>,
) -> anyhow::Result<ConvoyConfig> {
    let mut config = ConvoyConfig::load_or_default(path)?;
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(dir) = data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(backend) = backend {
        config.storage.backend = backend;
    }
    config.validate()?;
    Ok(config)
}

fn open_services(config: &ConvoyConfig) -> anyhow::Result<Services> {
    let backend = convoy_state::open_backend(&config.storage)?;
    Ok(Services::open(backend, config)?)
}

async fn run_serve(config: ConvoyConfig) -> anyhow::Result<()> {
    info!("convoy daemon starting");

    let services = open_services(&config)?;
    let reconciler = services.reconciler();

    if config.reconcile.on_startup {
        match reconciler.run_once() {
            Ok(reports) => {
                for report in reports {
                    info!(
                        job = %report.job,
                        examined = report.examined,
                        changed = report.changed,
                        "startup reconciliation finished"
                    );
                }
            }
            Err(e) => warn!(error = %e, "startup reconciliation failed"),
        }
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Background reconciliation ──────────────────────────────

    let interval_secs = config.reconcile.interval_secs;
    let reconcile_handle = if interval_secs > 0 {
        Some(tokio::spawn(async move {
            reconciler
                .run(Duration::from_secs(interval_secs), shutdown_rx)
                .await;
        }))
    } else {
        info!("background reconciliation disabled");
        None
    };

    // ── API server ─────────────────────────────────────────────

    let router = convoy_api::build_router(services);
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!(addr = %listener.local_addr()?, "API server starting");

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Some(handle) = reconcile_handle {
        let _ = handle.await;
    }

    info!("convoy daemon stopped");
    Ok(())
}

fn run_reconcile(config: ConvoyConfig) -> anyhow::Result<()> {
    let services = open_services(&config)?;
    let reconciler = services.reconciler();

    for report in reconciler.run_once()? {
        info!(job = %report.job, examined = report.examined, changed = report.changed, "reconciled");
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let status = reconciler.sync_status()?;
    println!(
        "gitops total: {}, main deployments: {}, synchronized: {}",
        status.gitops_total,
        status.main_deployments,
        if status.totals_match { "yes" } else { "no" }
    );
    Ok(())
}
