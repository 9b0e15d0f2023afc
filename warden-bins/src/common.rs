//! Common utilities for all binaries
//!
//! Shared initialization, CLI parsing, and setup code.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use warden_core::gate::RegistryHealth;

/// Common CLI arguments for all binaries
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/warden.toml")]
    pub config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Initialize tracing/logging
pub fn init_logging(args: &CommonArgs) -> Result<()> {
    warden_core::utils::init_logger(&args.log_level, args.json_logs)
}

/// Log a registry health summary
pub fn print_health(health: &RegistryHealth) {
    tracing::info!("=== Registry Health ===");
    tracing::info!("Healthy: {}", health.healthy);
    if let Some(reason) = &health.failover_reason {
        tracing::warn!("Failover: {}", reason);
    }
    for violation in &health.violations {
        tracing::warn!("Integrity violation: {}", violation);
    }
    if health.kill_switch_active {
        tracing::warn!(
            "Kill switch ACTIVE (by {})",
            health.kill_switch_by.as_deref().unwrap_or("unknown")
        );
    }
    tracing::info!(
        "Strategies: {} total, {} approved",
        health.total_strategies,
        health.approved_count
    );
    for (status, count) in &health.counts_by_status {
        tracing::info!("  {:<22} {}", status, count);
    }
    if !health.open_breakers.is_empty() {
        tracing::info!("Open breakers: {}", health.open_breakers.join(", "));
    }
    if !health.emergency_suspensions.is_empty() {
        tracing::info!(
            "Emergency suspensions: {}",
            health.emergency_suspensions.join(", ")
        );
    }
}
