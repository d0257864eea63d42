//! eventwatchd — the eventwatch daemon.
//!
//! Single binary that assembles the watcher:
//! - Status store (redb)
//! - Eventing stats client
//! - Alert notifier
//! - Reconciler + pass scheduler
//! - Health endpoint + REST API
//!
//! # Usage
//!
//! ```text
//! eventwatchd run --config /etc/eventwatch/eventwatch.toml
//! eventwatchd check --config /etc/eventwatch/eventwatch.toml
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use eventwatch_core::WatcherConfig;
use eventwatch_health::{Reconciler, Thresholds};
use eventwatch_state::StateStore;
use eventwatch_stats::EventingClient;

#[derive(Parser)]
#[command(name = "eventwatchd", about = "Eventing function watchdog")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the watcher: scheduled passes plus the health server.
    Run {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Store the status database in this directory instead of `store.path`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Run a single pass and print its report as JSON.
    Check {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Store the status database in this directory instead of `store.path`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => run(&config, port, data_dir).await,
        Command::Check { config, data_dir } => check_once(&config, data_dir).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,eventwatchd=debug,eventwatch=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Load config and assemble the reconciler and its store.
fn assemble(
    config_path: &Path,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<(WatcherConfig, StateStore, Arc<Reconciler>)> {
    let config = WatcherConfig::load(config_path)
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    info!(path = %config_path.display(), "config loaded");

    let db_path = match data_dir {
        Some(dir) => dir.join("status.redb"),
        None => config.store.path.clone(),
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "status store opened");

    let mut client = EventingClient::new(&config.eventing.base_url, config.request_timeout())?;
    if let Some(username) = &config.eventing.username {
        client = client.with_basic_auth(username, config.eventing.password.as_deref());
    }
    info!(base_url = %client.base_url(), "eventing client initialized");

    let notifier = eventwatch_notify::build_notifier(&config.alerts)?;

    let reconciler = Reconciler::new(
        Arc::new(client),
        Arc::new(store.clone()),
        notifier,
        Thresholds {
            backlog_threshold: config.watcher.backlog_threshold,
        },
    )
    .with_concurrency(config.watcher.concurrency);

    Ok((config, store, Arc::new(reconciler)))
}

async fn run(config_path: &Path, port: Option<u16>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    info!("eventwatch daemon starting");

    let (config, store, reconciler) = assemble(config_path, data_dir)?;
    let schedule = config.schedule()?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start pass scheduler ───────────────────────────────────

    let scheduler_handle = tokio::spawn(eventwatch_health::run_scheduler(
        reconciler.clone(),
        schedule,
        shutdown_rx,
    ));

    // ── Start API server ───────────────────────────────────────

    let router = eventwatch_api::build_router(eventwatch_api::ApiState::new(store, reconciler));
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.server.port)));

    info!(%addr, "health server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Let the in-flight pass finish.
    let _ = scheduler_handle.await;

    info!("eventwatch daemon stopped");
    Ok(())
}

async fn check_once(config_path: &Path, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let (_config, _store, reconciler) = assemble(config_path, data_dir)?;

    let report = reconciler.run_pass().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(error) = report.error.filter(|_| !report.completed) {
        anyhow::bail!("pass aborted: {error}");
    }
    Ok(())
}

/// Resolve on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
