//! Alert management for the validation gate
//!
//! Provides:
//! - Severity levels (Critical, Error, Warning, Info)
//! - Categories matching the gate's subsystems
//! - Pluggable sinks (console, JSONL file, in-memory for tests)
//! - Rate limiting per alert id; critical alerts are never rate limited
//! - Auto-resolve of alerts that have gone quiet
//! - A bounded recent-alert history for health reporting
//!
//! Delivery happens on a dedicated dispatcher thread fed through a bounded
//! crossbeam channel, so raising an alert never blocks the caller on I/O. A
//! sink that fails is logged and skipped; it never affects gate decisions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational alerts (no action required)
    Info = 0,
    /// Warning alerts (should investigate)
    Warning = 1,
    /// Error alerts (requires attention)
    Error = 2,
    /// Critical alerts (immediate action required)
    Critical = 3,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Info => "ℹ️",
            Self::Warning => "⚠️",
            Self::Error => "❌",
            Self::Critical => "🚨",
        }
    }
}

/// Subsystem that raised the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Kill switch and emergency suspensions
    Emergency,
    /// Breaker trips and recoveries
    CircuitBreaker,
    /// Live performance degradation and quarantine
    Degradation,
    /// Strategy definition changed since validation
    CodeChange,
    /// Persistence, integrity and failover
    Registry,
    /// Monitor cycle failures
    Monitor,
    /// Daily recommendation quota
    Quota,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "EMERGENCY",
            Self::CircuitBreaker => "CIRCUIT_BREAKER",
            Self::Degradation => "DEGRADATION",
            Self::CodeChange => "CODE_CHANGE",
            Self::Registry => "REGISTRY",
            Self::Monitor => "MONITOR",
            Self::Quota => "QUOTA",
        }
    }
}

/// Alert identifier for deduplication and rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId {
    pub category: AlertCategory,
    pub name: String,
}

impl AlertId {
    pub fn new(category: AlertCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}.{}", self.category.as_str(), self.name)
    }
}

/// Alert with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub severity: AlertSeverity,
    pub message: String,
    /// Strategy the alert concerns, if any
    pub strategy: Option<String>,
    pub details: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        category: AlertCategory,
        name: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: AlertId::new(category, name),
            severity,
            message: message.into(),
            strategy: None,
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Rate-limit key; the same alert for two strategies is tracked separately
    fn rate_key(&self) -> (AlertId, Option<String>) {
        (self.id.clone(), self.strategy.clone())
    }

    /// Format alert for display
    pub fn format(&self) -> String {
        let mut output = format!(
            "[{}] {} {}",
            self.severity.emoji(),
            self.severity.as_str(),
            self.id.key()
        );
        if let Some(strategy) = &self.strategy {
            output.push_str(&format!(" ({})", strategy));
        }
        output.push_str(&format!(" - {}", self.message));

        if !self.details.is_empty() {
            output.push_str("\n  Details:");
            for (key, value) in &self.details {
                output.push_str(&format!("\n    {}: {}", key, value));
            }
        }

        output
    }

    /// Format alert as JSON for structured logs
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize alert to JSON")
    }
}

/// Destination for alerts
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    /// Alerts below this severity are not delivered to the sink
    fn min_severity(&self) -> AlertSeverity {
        AlertSeverity::Info
    }

    fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts through `tracing` at a level matching their severity
pub struct ConsoleSink {
    min_severity: AlertSeverity,
}

impl ConsoleSink {
    pub fn new(min_severity: AlertSeverity) -> Self {
        Self { min_severity }
    }
}

impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn min_severity(&self) -> AlertSeverity {
        self.min_severity
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        let formatted = alert.format();
        match alert.severity {
            AlertSeverity::Info => info!("{}", formatted),
            AlertSeverity::Warning => warn!("{}", formatted),
            AlertSeverity::Error | AlertSeverity::Critical => error!("{}", formatted),
        }
        Ok(())
    }
}

/// Appends one JSON object per alert
pub struct FileSink {
    path: PathBuf,
    min_severity: AlertSeverity,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, min_severity: AlertSeverity) -> Self {
        Self {
            path: path.into(),
            min_severity,
        }
    }
}

impl AlertSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    fn min_severity(&self) -> AlertSeverity {
        self.min_severity
    }

    fn deliver(&self, alert: &Alert) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open alert log {:?}", self.path))?;

        let json = alert.to_json()?;
        writeln!(file, "{}", json).context("Failed to write alert to file")?;
        file.flush().context("Failed to flush alert log file")?;
        Ok(())
    }
}

/// Configured alert output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AlertOutput {
    Console {
        #[serde(default = "default_min_severity")]
        min_severity: AlertSeverity,
    },
    File {
        path: PathBuf,
        #[serde(default = "default_min_severity")]
        min_severity: AlertSeverity,
    },
}

fn default_min_severity() -> AlertSeverity {
    AlertSeverity::Warning
}

impl AlertOutput {
    fn into_sink(self) -> Arc<dyn AlertSink> {
        match self {
            AlertOutput::Console { min_severity } => Arc::new(ConsoleSink::new(min_severity)),
            AlertOutput::File { path, min_severity } => {
                Arc::new(FileSink::new(path, min_severity))
            }
        }
    }
}

/// Alert manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertManagerConfig {
    pub outputs: Vec<AlertOutput>,
    /// Minimum time between sending the same non-critical alert (seconds)
    pub rate_limit_secs: u64,
    /// Forget alert state after this long without a repeat (seconds)
    pub auto_resolve_secs: u64,
    /// Pending deliveries before new alerts are dropped
    pub queue_capacity: usize,
    /// Alerts kept in memory for health reporting
    pub history_capacity: usize,
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            outputs: vec![AlertOutput::Console {
                min_severity: AlertSeverity::Warning,
            }],
            rate_limit_secs: 60,
            auto_resolve_secs: 300,
            queue_capacity: 1024,
            history_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
struct AlertState {
    last_seen: DateTime<Utc>,
    count: u64,
    last_sent: Option<DateTime<Utc>>,
}

enum Dispatch {
    Deliver(Alert),
    Flush(Sender<()>),
}

/// Central alert manager
pub struct AlertManager {
    config: AlertManagerConfig,
    sender: Option<Sender<Dispatch>>,
    dispatcher: Option<thread::JoinHandle<()>>,
    active_alerts: RwLock<HashMap<(AlertId, Option<String>), AlertState>>,
    recent: RwLock<VecDeque<Alert>>,
    dropped: AtomicU64,
}

impl AlertManager {
    /// Build sinks from the configured outputs
    pub fn new(config: AlertManagerConfig) -> Self {
        let sinks = config
            .outputs
            .iter()
            .cloned()
            .map(AlertOutput::into_sink)
            .collect();
        Self::with_sinks(config, sinks)
    }

    /// Configured outputs plus extra sinks
    pub fn with_extra_sinks(config: AlertManagerConfig, extra: Vec<Arc<dyn AlertSink>>) -> Self {
        let mut sinks: Vec<Arc<dyn AlertSink>> = config
            .outputs
            .iter()
            .cloned()
            .map(AlertOutput::into_sink)
            .collect();
        sinks.extend(extra);
        Self::with_sinks(config, sinks)
    }

    fn with_sinks(config: AlertManagerConfig, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        info!("AlertManager initialized with {} sinks", sinks.len());

        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let dispatcher = thread::Builder::new()
            .name("warden-alerts".to_string())
            .spawn(move || Self::dispatch_loop(sinks, receiver));

        let (sender, dispatcher) = match dispatcher {
            Ok(handle) => (Some(sender), Some(handle)),
            Err(e) => {
                // Alerts still reach the log and the recent history
                error!("Failed to spawn alert dispatcher: {}", e);
                (None, None)
            }
        };

        Self {
            config,
            sender,
            dispatcher,
            active_alerts: RwLock::new(HashMap::new()),
            recent: RwLock::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
        }
    }

    fn dispatch_loop(sinks: Vec<Arc<dyn AlertSink>>, receiver: Receiver<Dispatch>) {
        for message in receiver {
            match message {
                Dispatch::Deliver(alert) => {
                    for sink in &sinks {
                        if alert.severity < sink.min_severity() {
                            continue;
                        }
                        if let Err(e) = sink.deliver(&alert) {
                            error!("Alert sink '{}' failed: {:#}", sink.name(), e);
                        }
                    }
                }
                Dispatch::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("Alert dispatcher stopping");
    }

    /// Queue an alert for delivery; returns false if it was rate limited or dropped
    pub fn send(&self, alert: Alert) -> bool {
        if !self.should_send(&alert) {
            debug!("Alert {} rate limited", alert.id.key());
            return false;
        }

        self.update_alert_state(&alert);

        {
            let mut recent = self.recent.write();
            recent.push_back(alert.clone());
            while recent.len() > self.config.history_capacity.max(1) {
                recent.pop_front();
            }
        }

        let Some(sender) = &self.sender else {
            return false;
        };
        match sender.try_send(Dispatch::Deliver(alert)) {
            Ok(()) => true,
            Err(TrySendError::Full(Dispatch::Deliver(alert)))
            | Err(TrySendError::Disconnected(Dispatch::Deliver(alert))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!("Alert queue unavailable, dropping {}", alert.id.key());
                false
            }
            Err(_) => false,
        }
    }

    fn should_send(&self, alert: &Alert) -> bool {
        if alert.severity == AlertSeverity::Critical {
            return true;
        }

        // Measured on alert timestamps so the sender's clock governs the window
        let window = chrono::Duration::seconds(self.config.rate_limit_secs as i64);
        match self
            .active_alerts
            .read()
            .get(&alert.rate_key())
            .and_then(|s| s.last_sent)
        {
            Some(last_sent) => alert.timestamp - last_sent >= window,
            None => true,
        }
    }

    fn update_alert_state(&self, alert: &Alert) {
        let now = alert.timestamp;
        self.active_alerts
            .write()
            .entry(alert.rate_key())
            .and_modify(|state| {
                state.last_seen = now;
                state.count += 1;
                state.last_sent = Some(now);
            })
            .or_insert(AlertState {
                last_seen: now,
                count: 1,
                last_sent: Some(now),
            });
    }

    /// Block until every alert queued so far has been handed to the sinks
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if sender.send(Dispatch::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(Duration::from_secs(5));
        }
    }

    /// Most recent alerts, oldest first
    pub fn recent(&self) -> Vec<Alert> {
        self.recent.read().iter().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_alerts.read().len()
    }

    /// Times an alert id has been sent for a strategy
    pub fn occurrences(&self, id: &AlertId, strategy: Option<&str>) -> u64 {
        self.active_alerts
            .read()
            .get(&(id.clone(), strategy.map(str::to_string)))
            .map(|s| s.count)
            .unwrap_or(0)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Forget alert state quiet for longer than `auto_resolve_secs` as of `now`
    ///
    /// Returns how many alerts were resolved. A resolved alert is no longer
    /// rate limited and its occurrence count starts again.
    pub fn cleanup_old_alerts(&self, now: DateTime<Utc>) -> usize {
        let auto_resolve = chrono::Duration::seconds(self.config.auto_resolve_secs as i64);
        let mut active = self.active_alerts.write();
        let before = active.len();

        active.retain(|(id, _), state| {
            if now - state.last_seen > auto_resolve {
                debug!("Auto-resolving inactive alert {}", id.key());
                false
            } else {
                true
            }
        });
        before - active.len()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertManagerConfig::default())
    }
}

impl Drop for AlertManager {
    fn drop(&mut self) {
        // Closing the channel ends the dispatcher loop after it drains
        let _ = self.sender.take();
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySink;
    use tempfile::tempdir;

    fn quiet_config() -> AlertManagerConfig {
        AlertManagerConfig {
            outputs: vec![],
            ..Default::default()
        }
    }

    #[test]
    fn test_alert_creation() {
        let alert = Alert::new(
            AlertCategory::CircuitBreaker,
            "breaker_tripped",
            AlertSeverity::Critical,
            "Circuit breaker tripped",
        )
        .for_strategy("sharp_action")
        .with_detail("loss_streak", 5)
        .with_detail("threshold", 5);

        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.id.category, AlertCategory::CircuitBreaker);
        assert_eq!(alert.strategy.as_deref(), Some("sharp_action"));
        assert_eq!(alert.details.len(), 2);
    }

    #[test]
    fn test_alert_formatting() {
        let alert = Alert::new(
            AlertCategory::Registry,
            "persist_failed",
            AlertSeverity::Error,
            "Registry write failed",
        );

        let formatted = alert.format();
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("REGISTRY.persist_failed"));
        assert!(formatted.contains("Registry write failed"));
    }

    #[test]
    fn test_alert_to_json() {
        let alert = Alert::new(
            AlertCategory::Degradation,
            "performance_degradation",
            AlertSeverity::Warning,
            "Win rate down 12%",
        );

        let json = alert.to_json().unwrap();
        assert!(json.contains("\"name\":\"performance_degradation\""));
        assert!(json.contains("\"category\":\"degradation\""));
    }

    #[test]
    fn test_sinks_receive_alerts_above_threshold() {
        let sink = Arc::new(MemorySink::new());
        let manager = AlertManager::with_extra_sinks(quiet_config(), vec![sink.clone()]);

        assert!(manager.send(Alert::new(
            AlertCategory::Emergency,
            "kill_switch",
            AlertSeverity::Critical,
            "Kill switch activated",
        )));
        manager.flush();

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].id.name, "kill_switch");
    }

    #[test]
    fn test_file_sink_appends_json_lines() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("alerts.log");

        let config = AlertManagerConfig {
            outputs: vec![AlertOutput::File {
                path: log_path.clone(),
                min_severity: AlertSeverity::Info,
            }],
            ..Default::default()
        };
        let manager = AlertManager::new(config);

        manager.send(Alert::new(
            AlertCategory::Quota,
            "quota_exhausted",
            AlertSeverity::Info,
            "Daily quota reached",
        ));
        manager.flush();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("quota_exhausted"));
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn test_rate_limiting_per_strategy() {
        let manager = AlertManager::new(quiet_config());
        let make = |strategy: &str| {
            Alert::new(
                AlertCategory::Degradation,
                "performance_degradation",
                AlertSeverity::Warning,
                "degraded",
            )
            .for_strategy(strategy)
        };

        assert!(manager.send(make("a")));
        assert!(!manager.send(make("a")));
        // Different strategy, separate rate limit
        assert!(manager.send(make("b")));
        assert_eq!(manager.active_count(), 2);
        assert_eq!(manager.recent().len(), 2);
    }

    #[test]
    fn test_rate_limit_window_follows_alert_timestamps() {
        let manager = AlertManager::new(quiet_config());
        let t0 = DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let at = |secs: i64| {
            Alert::new(
                AlertCategory::Quota,
                "daily_quota_exhausted",
                AlertSeverity::Info,
                "spent",
            )
            .for_strategy("a")
            .at(t0 + chrono::Duration::seconds(secs))
        };

        assert!(manager.send(at(0)));
        assert!(!manager.send(at(59)));
        assert!(manager.send(at(60)));
        let id = AlertId::new(AlertCategory::Quota, "daily_quota_exhausted");
        assert_eq!(manager.occurrences(&id, Some("a")), 2);
    }

    #[test]
    fn test_quiet_alerts_auto_resolve() {
        let manager = AlertManager::new(quiet_config());
        let t0 = DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let make = |name: &str, at: DateTime<Utc>| {
            Alert::new(AlertCategory::Degradation, name, AlertSeverity::Warning, "degraded").at(at)
        };

        manager.send(make("old", t0));
        manager.send(make("fresh", t0 + chrono::Duration::seconds(200)));
        assert_eq!(manager.active_count(), 2);

        // auto_resolve_secs defaults to 300
        assert_eq!(manager.cleanup_old_alerts(t0 + chrono::Duration::seconds(300)), 0);
        assert_eq!(manager.cleanup_old_alerts(t0 + chrono::Duration::seconds(301)), 1);
        assert_eq!(manager.active_count(), 1);

        // Resolved alerts are no longer rate limited
        assert!(manager.send(make("old", t0 + chrono::Duration::seconds(302))));
        let id = AlertId::new(AlertCategory::Degradation, "old");
        assert_eq!(manager.occurrences(&id, None), 1);
    }

    #[test]
    fn test_critical_alerts_bypass_rate_limit() {
        let manager = AlertManager::new(quiet_config());
        let make = || {
            Alert::new(
                AlertCategory::CircuitBreaker,
                "breaker_tripped",
                AlertSeverity::Critical,
                "tripped",
            )
        };

        assert!(manager.send(make()));
        assert!(manager.send(make()));
        let id = AlertId::new(AlertCategory::CircuitBreaker, "breaker_tripped");
        assert_eq!(manager.occurrences(&id, None), 2);
    }

    #[test]
    fn test_failing_sink_does_not_stop_others() {
        struct Broken;
        impl AlertSink for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn deliver(&self, _alert: &Alert) -> Result<()> {
                anyhow::bail!("sink offline")
            }
        }

        let memory = Arc::new(MemorySink::new());
        let manager =
            AlertManager::with_extra_sinks(quiet_config(), vec![Arc::new(Broken), memory.clone()]);

        manager.send(Alert::new(
            AlertCategory::Monitor,
            "cycle_failed",
            AlertSeverity::Error,
            "cycle failed",
        ));
        manager.flush();
        assert_eq!(memory.received().len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let config = AlertManagerConfig {
            history_capacity: 3,
            ..quiet_config()
        };
        let manager = AlertManager::new(config);
        for i in 0..5 {
            manager.send(Alert::new(
                AlertCategory::Registry,
                format!("alert_{}", i),
                AlertSeverity::Info,
                "x",
            ));
        }
        let names: Vec<String> = manager.recent().into_iter().map(|a| a.id.name).collect();
        assert_eq!(names, vec!["alert_2", "alert_3", "alert_4"]);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Error);
        assert!(AlertSeverity::Error > AlertSeverity::Warning);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
    }

    #[test]
    fn test_output_config_from_toml() {
        let outputs: AlertManagerConfig = toml::from_str(
            r#"
            rate_limit_secs = 30
            [[outputs]]
            type = "console"
            min_severity = "error"
            [[outputs]]
            type = "file"
            path = "/var/log/warden/alerts.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(outputs.rate_limit_secs, 30);
        assert_eq!(
            outputs.outputs[1],
            AlertOutput::File {
                path: PathBuf::from("/var/log/warden/alerts.jsonl"),
                min_severity: AlertSeverity::Warning,
            }
        );
    }
}
