//! valved - valve telemetry consistency monitor
//!
//! Accepts valve status frames over TCP, validates each valve's stream and
//! logs every anomaly it finds.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};
use valved::config::{Config, CONFIG_PATH};
use valved::ingest::Ingestor;
use valved::report::LogReporter;
use valved::transport;

#[derive(Parser)]
#[command(name = "valved", version, about = "Valve telemetry consistency monitor")]
struct Args {
    /// Config file (default: /etc/valved/config.toml, then /var/lib/valved/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    listen: Option<String>,

    /// Override the stale threshold, in seconds
    #[arg(long)]
    stale_threshold: Option<f64>,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_level(true)
        .init();

    let args = Args::parse();

    if args.init_config {
        let path = args.config.unwrap_or_else(|| PathBuf::from(CONFIG_PATH));
        Config::save_default(&path)?;
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(addr) = args.listen {
        config.daemon.listen_addr = addr;
    }
    if let Some(threshold) = args.stale_threshold {
        config.validator.stale_threshold = threshold;
    }
    config.check()?;

    info!(
        "valved v{} starting (filter={}, stale_threshold={}s)",
        env!("CARGO_PKG_VERSION"),
        config.daemon.topic_filter,
        config.validator.stale_threshold
    );

    let listener = transport::bind(&config.daemon.listen_addr).await?;
    let (tx, rx) = mpsc::channel(config.daemon.channel_capacity);
    let listener_task = tokio::spawn(transport::listen(listener, tx));

    let heartbeat = (config.daemon.stats_interval_secs > 0)
        .then(|| Duration::from_secs(config.daemon.stats_interval_secs));

    let ingestor = Ingestor::new(
        config.validator.clone(),
        config.daemon.topic_filter.clone(),
        LogReporter::new(),
    );
    let ingestor = ingestor.run(rx, heartbeat, shutdown_signal()).await;

    listener_task.abort();
    ingestor.sink().log_stats();
    info!(
        "Shutting down gracefully ({} valves tracked)",
        ingestor.validator().registry().len()
    );

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
