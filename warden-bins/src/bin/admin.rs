//! Warden administrative CLI
//!
//! Operates directly on the persisted registry. Run it while the daemon is
//! stopped: the daemon keeps its own in-memory state and its next write
//! would replace changes made here.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use warden_bins::common::{init_logging, print_health, CommonArgs};
use warden_bins::config::DaemonConfig;
use warden_core::core::{Clock, SystemClock};
use warden_core::gate::RestoreOutcome;
use warden_core::monitoring::MetricsRegistry;
use warden_core::registry::{integrity, BackupManager, RecordTemplate, RegistryStore};
use warden_core::{ValidationGate, ValidationStatus};

#[derive(Parser, Debug)]
#[command(author, version, about = "Administer the strategy validation registry")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show registry health and every strategy's status
    Status {
        /// Print the health report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Block or unblock every strategy
    KillSwitch {
        #[command(subcommand)]
        action: KillSwitchAction,
    },
    /// Emergency-suspend one strategy
    Suspend {
        strategy: String,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
    },
    /// Move a strategy to another status
    Promote {
        strategy: String,
        /// Target status, e.g. APPROVED or validation-pending
        status: ValidationStatus,
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Write a timestamped backup now
    Backup,
    /// Check the registry file and backups without changing anything
    Verify,
    /// Leave failover once the integrity check passes
    RestoreHealth {
        #[arg(long)]
        by: String,
    },
}

#[derive(Subcommand, Debug)]
enum KillSwitchAction {
    Activate {
        #[arg(long)]
        by: String,
        #[arg(long)]
        reason: String,
    },
    Deactivate {
        #[arg(long)]
        by: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.common)?;

    let mut config = DaemonConfig::load(&args.common.config)?;
    // One-shot commands have nothing to scrape
    config.gate.metrics.enabled = false;

    match args.command {
        Command::Verify => verify(&config),
        command => run(&config, command),
    }
}

fn open_gate(config: &DaemonConfig) -> Result<ValidationGate> {
    let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
    ValidationGate::builder(config.gate.clone())
        .metrics(metrics)
        .open()
        .context("Failed to open validation gate")
}

fn run(config: &DaemonConfig, command: Command) -> Result<()> {
    let gate = open_gate(config)?;

    match command {
        Command::Status { json } => {
            let health = gate.health();
            if json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                print_health(&health);
                for name in gate.strategies() {
                    if let Some(record) = gate.record(&name) {
                        println!(
                            "{:<24} {:<22} {} approved={}",
                            name,
                            record.status(),
                            record.current_version.version_id,
                            gate.is_approved(&name)
                        );
                    }
                }
            }
        }
        Command::KillSwitch { action } => match action {
            KillSwitchAction::Activate { by, reason } => {
                let outcome = gate.activate_kill_switch(&by, &reason)?;
                if outcome.newly_activated {
                    println!(
                        "Kill switch activated; suspended: {}",
                        if outcome.suspended.is_empty() {
                            "none".to_string()
                        } else {
                            outcome.suspended.join(", ")
                        }
                    );
                } else {
                    println!("Kill switch was already active");
                }
            }
            KillSwitchAction::Deactivate { by } => {
                if gate.deactivate_kill_switch(&by)? {
                    println!("Kill switch deactivated; suspended strategies need re-validation");
                } else {
                    println!("Kill switch was not active");
                }
            }
        },
        Command::Suspend {
            strategy,
            by,
            reason,
        } => {
            if gate.emergency_suspend(&strategy, &by, &reason)? {
                println!("'{}' emergency suspended", strategy);
            } else {
                println!("'{}' was already suspended", strategy);
            }
        }
        Command::Promote {
            strategy,
            status,
            by,
            reason,
        } => {
            let reason = reason.unwrap_or_else(|| format!("manual promotion to {}", status));
            let record = gate.promote_with_reason(&strategy, status, &by, &reason)?;
            println!(
                "'{}' is now {} (approved={})",
                strategy,
                record.status(),
                gate.is_approved(&strategy)
            );
        }
        Command::Backup => {
            let path = gate.backup_now()?;
            println!("Backup written to {}", path.display());
        }
        Command::RestoreHealth { by } => match gate.restore_health(&by)? {
            RestoreOutcome::AlreadyHealthy => println!("Registry already healthy"),
            RestoreOutcome::Restored { approved } => {
                println!("Registry restored; approved: {}", approved.join(", "))
            }
            RestoreOutcome::StillUnhealthy(violations) => {
                for violation in &violations {
                    eprintln!("violation: {}", violation);
                }
                bail!("{} integrity violation(s) remain", violations.len());
            }
        },
        Command::Verify => bail!("verify reads the registry files without opening the gate"),
    }

    gate.alerts().flush();
    Ok(())
}

/// Read-only check of the primary file and every backup
fn verify(config: &DaemonConfig) -> Result<()> {
    let gate_config = &config.gate;
    let template = RecordTemplate {
        window_size: gate_config.analyzer.window_size,
        breaker: gate_config.breaker.clone(),
        constraints: gate_config.constraints.clone(),
    };

    let now = SystemClock.now();
    let store = RegistryStore::new(&gate_config.registry.path);
    let mut problems = 0usize;

    match store.load(&template, now) {
        Ok(Some(snapshot)) => {
            info!(
                "Primary {:?}: checksum ok, format v{}, {} strategies, {} approved",
                store.path(),
                snapshot.format_version,
                snapshot.records.len(),
                snapshot.approved.len()
            );
            if let Some(failover) = &snapshot.failover {
                println!(
                    "Registry is in failover since {}: {}",
                    failover.since, failover.reason
                );
            }
            let violations =
                integrity::check(&snapshot.approved, &snapshot.records, &snapshot.emergency);
            for violation in &violations {
                println!("violation: {}", violation);
            }
            problems += violations.len();
        }
        Ok(None) => println!("No primary registry at {}", store.path().display()),
        Err(e) => {
            println!("Primary registry unusable: {}", e);
            problems += 1;
        }
    }

    let backups = BackupManager::new(
        &gate_config.registry.backup_dir,
        gate_config.registry.retention_days,
    );
    match backups.latest_valid(&template, now) {
        Ok(Some((entry, _))) => println!(
            "Newest valid backup: {} (taken {})",
            entry.path.display(),
            entry.taken_at
        ),
        Ok(None) => println!("No valid backup in {}", backups.dir().display()),
        Err(e) => println!("Backup directory unusable: {}", e),
    }

    if problems > 0 {
        bail!("registry verification found {} problem(s)", problems);
    }
    println!("Registry OK");
    Ok(())
}
