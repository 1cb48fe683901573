//! nfscaled — the nfscale daemon.
//!
//! Loads `nfscale.toml`, brings the fleet up to its service floor, then runs
//! the decision engine until Ctrl-C or SIGTERM.
//!
//! # Usage
//!
//! ```text
//! nfscaled --config /etc/nfscale/nfscale.toml
//! nfscaled --config nfscale.toml --check
//! ```

mod logging;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use nfscale_autoscale::{DecisionEngine, EngineSettings};
use nfscale_core::Config;
use nfscale_fleet::Fleet;
use nfscale_monitor::HttpMetricSource;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "nfscaled", about = "Forecast-driven autoscaler for network-function instances")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    if cli.check {
        println!(
            "{}: ok ({} hosts, capacity {}, forecaster {:?})",
            cli.config.display(),
            config.docker_hosts.len(),
            config.fleet_capacity(),
            config.manager.forecaster
        );
        return Ok(());
    }

    logging::init(&config.logger)?;
    run(config).await
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::from_file(path).with_context(|| format!("invalid configuration {}", path.display()))
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        hosts = config.docker_hosts.len(),
        capacity = config.fleet_capacity(),
        "nfscaled starting"
    );

    // ── Components ─────────────────────────────────────────────

    let source = HttpMetricSource::new(
        config.monitor.address(),
        std::time::Duration::from_secs(config.monitor.timeout),
    );
    info!(addr = %config.monitor.address(), "metric source configured");

    let forecaster = nfscale_forecast::from_config(&config.manager)
        .context("invalid forecaster configuration")?;

    let fleet = Fleet::from_config(&config);
    for host in fleet.hosts() {
        info!(addr = %host.address(), capacity = host.capacity(), "host registered");
    }

    let mut engine = DecisionEngine::new(
        Box::new(source),
        forecaster,
        Box::new(fleet),
        EngineSettings::from_config(&config.manager, &config.monitor),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Control loop ───────────────────────────────────────────

    let mut init_shutdown = shutdown_rx.clone();
    tokio::select! {
        running = engine.initialize() => {
            info!(running, floor = config.manager.minimal_services, "fleet initialized");
        }
        _ = init_shutdown.changed() => {
            info!("nfscaled stopped during initialization");
            return Ok(());
        }
    }

    engine.run(shutdown_rx).await;

    info!("nfscaled stopped");
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
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
