//! Background monitor and backup tasks owned by the gate
//!
//! Both loops hold only a `Weak` reference, so dropping the last `Arc`
//! ends them even without an explicit shutdown. The blocking work runs on
//! tokio's blocking pool and each loop awaits it before checking for
//! shutdown, so an in-flight backup always completes.

use super::ValidationGate;
use crate::core::GateError;
use crate::monitor::OutcomeFeed;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub(super) struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl ValidationGate {
    /// Spawn the monitor loop and the backup loop on the current runtime
    pub fn start(self: &Arc<Self>, feed: Arc<dyn OutcomeFeed>) -> Result<(), GateError> {
        let runtime = Handle::try_current().map_err(|_| GateError::NoRuntime)?;

        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            warn!("Background tasks already running");
            return Ok(());
        }

        let (shutdown, rx) = watch::channel(false);
        let mut handles = Vec::new();

        if self.config.monitor.enabled {
            let period = Duration::from_secs(self.config.monitor.interval_secs);
            handles.push(runtime.spawn(monitor_loop(
                Arc::downgrade(self),
                feed,
                period,
                rx.clone(),
            )));
            info!("Monitor loop started (every {:?})", period);
        }

        if self.config.registry.backup_interval_secs > 0 {
            let period = Duration::from_secs(self.config.registry.backup_interval_secs);
            handles.push(runtime.spawn(backup_loop(Arc::downgrade(self), period, rx)));
            info!("Backup loop started (every {:?})", period);
        }

        *tasks = Some(BackgroundTasks { shutdown, handles });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Stop the background loops, drain alerts and write a final snapshot
    pub async fn shutdown(&self) -> Result<(), GateError> {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            let _ = tasks.shutdown.send(true);
            for handle in tasks.handles {
                if let Err(e) = handle.await {
                    error!("Background task ended abnormally: {}", e);
                }
            }
            info!("Background tasks stopped");
        }

        self.alerts.flush();
        self.persist()
    }
}

/// Wait for the next tick; false once shutdown was requested
async fn next_tick(ticker: &mut tokio::time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *shutdown.borrow() {
            return false;
        }
        tokio::select! {
            _ = ticker.tick() => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn monitor_loop(
    gate: Weak<ValidationGate>,
    feed: Arc<dyn OutcomeFeed>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while next_tick(&mut ticker, &mut shutdown).await {
        let Some(gate) = gate.upgrade() else {
            break;
        };
        let feed = Arc::clone(&feed);
        let cycle = tokio::task::spawn_blocking(move || gate.run_monitor_cycle(feed.as_ref()));
        match cycle.await {
            Ok(report) => debug!(
                "Monitor cycle done: {} reports, {} failures",
                report.reports.len(),
                report.failures.len()
            ),
            Err(e) => error!("Monitor cycle aborted: {}", e),
        }
    }
    info!("Monitor loop stopped");
}

async fn backup_loop(gate: Weak<ValidationGate>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while next_tick(&mut ticker, &mut shutdown).await {
        let Some(gate) = gate.upgrade() else {
            break;
        };
        match tokio::task::spawn_blocking(move || gate.backup_now()).await {
            Ok(Ok(path)) => info!("Registry backup written to {:?}", path),
            // Already alerted by backup_now
            Ok(Err(_)) => {}
            Err(e) => error!("Backup task aborted: {}", e),
        }
    }
    info!("Backup loop stopped");
}

#[cfg(test)]
mod tests {
    use crate::config::GateConfig;
    use crate::core::{GateError, ValidationStatus};
    use crate::gate::ValidationGate;
    use crate::monitor::MemoryFeed;
    use crate::testing::StaticDefinition;
    use std::sync::Arc;

    fn config(dir: &std::path::Path) -> GateConfig {
        let mut config = GateConfig::rooted_at(dir);
        config.alerts.outputs.clear();
        config.monitor.interval_secs = 1;
        config.registry.backup_interval_secs = 1;
        config
    }

    #[test]
    fn test_start_without_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(ValidationGate::open(config(dir.path())).unwrap());
        let err = gate.start(Arc::new(MemoryFeed::new())).unwrap_err();
        assert!(matches!(err, GateError::NoRuntime));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_background_loops_run_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(ValidationGate::open(config(dir.path())).unwrap());
        gate.register_strategy(Arc::new(StaticDefinition::new("s", "v1")))
            .unwrap();
        gate.promote("s", ValidationStatus::ValidationPending, "ci").unwrap();
        gate.promote("s", ValidationStatus::Validated, "ci").unwrap();

        gate.start(Arc::new(MemoryFeed::new())).unwrap();
        assert!(gate.is_running());
        // Idempotent
        gate.start(Arc::new(MemoryFeed::new())).unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        gate.shutdown().await.unwrap();
        assert!(!gate.is_running());

        let backups = std::fs::read_dir(dir.path().join("backups"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
            .count();
        assert!(backups >= 1);
        assert!(gate.record("s").unwrap().last_checked.is_some());
    }
}
