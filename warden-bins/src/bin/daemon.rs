//! Warden validation gate daemon
//!
//! This binary runs:
//! - The validation gate over the configured registry
//! - The monitor loop polling the outcome feed
//! - The periodic backup task
//! - The `/metrics` and `/health` HTTP endpoints
//!
//! Ctrl+C stops the background tasks, lets an in-flight backup finish and
//! writes a final snapshot.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use warden_bins::common::{init_logging, print_health, CommonArgs};
use warden_bins::config::DaemonConfig;
use warden_core::monitor::{JsonlOutcomeFeed, MemoryFeed, OutcomeFeed};
use warden_core::monitoring::{HealthReporter, MetricsRegistry, MetricsServer};
use warden_core::ValidationGate;

#[derive(Parser, Debug)]
#[command(author, version, about = "Strategy validation gate daemon")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common)?;

    info!("=== Warden: Strategy Validation Gate ===");
    let config = DaemonConfig::load(&args.common.config)?;
    info!("Configuration loaded from {:?}", args.common.config);

    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
    let gate = Arc::new(
        ValidationGate::builder(config.gate.clone())
            .metrics(metrics.clone())
            .open()
            .context("Failed to open validation gate")?,
    );

    register_strategies(&gate, &config);

    let feed: Arc<dyn OutcomeFeed> = match &config.feed.outcomes_path {
        Some(path) => {
            info!("Reading live outcomes from {:?}", path);
            Arc::new(JsonlOutcomeFeed::new(path))
        }
        None => {
            warn!("No outcome feed configured; live monitoring will see no outcomes");
            Arc::new(MemoryFeed::new())
        }
    };
    gate.start(feed).context("Failed to start background tasks")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = if config.gate.metrics.enabled {
        let reporter: Arc<dyn HealthReporter> = gate.clone();
        let server = MetricsServer::new(config.gate.metrics.clone(), metrics.clone())
            .with_health(reporter);
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = server.serve(rx).await {
                error!("Metrics server failed: {:#}", e);
            }
        }))
    } else {
        None
    };

    // Setup Ctrl+C handler
    ctrlc::set_handler(move || {
        warn!("Received Ctrl+C, initiating graceful shutdown...");
        let _ = shutdown_tx.send(true);
    })
    .context("Failed to install Ctrl+C handler")?;

    print_health(&gate.health());
    info!("Gate running");

    let mut wait = shutdown_rx;
    while !*wait.borrow() {
        if wait.changed().await.is_err() {
            break;
        }
    }

    info!("Shutting down...");
    if let Err(e) = gate.shutdown().await {
        error!("Final registry write failed: {}", e);
    }
    if let Some(handle) = server {
        if let Err(e) = handle.await {
            error!("Metrics server task ended abnormally: {}", e);
        }
    }

    print_health(&gate.health());
    info!("Shutdown complete");
    Ok(())
}

/// Attach every configured definition and catch changes made while stopped
///
/// A strategy that cannot be fingerprinted is logged and skipped; it stays
/// blocked at the gate either way.
fn register_strategies(gate: &ValidationGate, config: &DaemonConfig) {
    for descriptor in &config.strategies {
        let name = descriptor.name().to_string();
        let known = gate.record(&name).is_some();

        if let Err(e) = gate.register_strategy(descriptor.clone().into_definition()) {
            error!("Failed to register strategy '{}': {}", name, e);
            continue;
        }

        if known {
            match gate.detect_modification(&name) {
                Ok(true) => warn!("'{}' changed since it was validated, re-validation required", name),
                Ok(false) => {}
                Err(e) => error!("Code change check failed for '{}': {}", name, e),
            }
        }

        match gate.record(&name) {
            Some(record) => info!(
                "Strategy '{}' {} ({})",
                name,
                record.status(),
                record.current_version.version_id
            ),
            None => warn!("Strategy '{}' has no record after registration", name),
        }
    }

    let configured: Vec<&str> = config.strategies.iter().map(|d| d.name()).collect();
    for name in gate.strategies() {
        if !configured.contains(&name.as_str()) {
            warn!(
                "Registry holds '{}' but the config does not define it; it stays blocked",
                name
            );
        }
    }
}
