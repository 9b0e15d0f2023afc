//! Validation gate service
//!
//! The single admission-control point: callers ask
//! [`ValidationGate::can_generate_recommendations`] before emitting any
//! strategy output and treat a denial as an unconditional veto.
//!
//! ## Checks (in order, first block wins)
//!
//! 1. Kill switch active
//! 2. Registry unhealthy (failover)
//! 3. Unknown strategy
//! 4. Fingerprint unavailable or changed
//! 5. Emergency suspension
//! 6. Circuit breaker open
//! 7. Not VALIDATED/APPROVED, or not in the approved set
//! 8. Allowed, with operational constraints echoed back
//!
//! ## Locking
//!
//! Global state (approved set, emergency controls, health) sits behind one
//! `RwLock`; each record behind its own `Mutex`. Locks are always taken
//! global first, record second. Persistence runs after every lock is
//! released and is serialized by its own lock, building the snapshot fresh
//! so the last writer always stores the latest state.

mod decision;
mod emergency;
mod lifecycle;
mod quota;
mod tasks;

pub use decision::{DenialCategory, GateDecision, Remedy};
pub use emergency::KillSwitchOutcome;
pub use lifecycle::AssessmentAction;
pub use quota::{DailyQuota, DailyUsage};

use crate::analysis::PerformanceAnalyzer;
use crate::config::GateConfig;
use crate::core::{Clock, GateError, SystemClock, ValidationError, ValidationStatus};
use crate::fingerprint::{FingerprintComputer, StrategyDefinition};
use crate::monitoring::{
    Alert, AlertCategory, AlertManager, AlertSeverity, AlertSink, HealthReporter, MetricsRegistry,
};
use crate::registry::{
    integrity, BackupManager, FailoverState, IntegrityViolation, RecordTemplate, RegistrySnapshot,
    RegistryStore, ValidationRecord, CURRENT_FORMAT_VERSION,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tasks::BackgroundTasks;
use tracing::{debug, error, info, warn};

type RecordHandle = Arc<Mutex<ValidationRecord>>;

struct GlobalState {
    approved: BTreeSet<String>,
    emergency: crate::resilience::EmergencyControls,
    failover: Option<FailoverState>,
    violations: Vec<IntegrityViolation>,
}

impl GlobalState {
    fn healthy(&self) -> bool {
        self.failover.is_none()
    }

    /// Returns false if already in failover
    fn enter_failover(&mut self, reason: &str, now: DateTime<Utc>) -> bool {
        self.approved.clear();
        if self.failover.is_some() {
            return false;
        }
        self.failover = Some(FailoverState {
            since: now,
            reason: reason.to_string(),
        });
        true
    }

    /// Whether the record may sit in the approved set right now
    fn may_approve(&self, record: &ValidationRecord) -> bool {
        record.is_approvable() && !self.emergency.blocks(&record.strategy_name) && self.healthy()
    }

    fn sync_approval(&mut self, record: &ValidationRecord) {
        if self.may_approve(record) {
            self.approved.insert(record.strategy_name.clone());
        } else {
            self.approved.remove(&record.strategy_name);
        }
    }
}

/// Registry health as reported to operators and `/health`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryHealth {
    pub healthy: bool,
    pub failover_reason: Option<String>,
    pub failover_since: Option<DateTime<Utc>>,
    pub violations: Vec<String>,
    pub kill_switch_active: bool,
    pub kill_switch_by: Option<String>,
    pub emergency_suspensions: Vec<String>,
    pub approved_count: usize,
    pub total_strategies: usize,
    pub counts_by_status: BTreeMap<String, usize>,
    pub open_breakers: Vec<String>,
    pub restored_from_backup: Option<PathBuf>,
}

/// Result of `restore_health`
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    AlreadyHealthy,
    Restored { approved: Vec<String> },
    StillUnhealthy(Vec<IntegrityViolation>),
}

/// Builder for [`ValidationGate`]
pub struct GateBuilder {
    config: GateConfig,
    clock: Option<Arc<dyn Clock>>,
    sinks: Vec<Arc<dyn AlertSink>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl GateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Load the registry, heal or fail over as needed, run the integrity check
    pub fn open(self) -> Result<ValidationGate, GateError> {
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(MetricsRegistry::default()));
        let alerts = Arc::new(AlertManager::with_extra_sinks(
            config.alerts.clone(),
            self.sinks,
        ));
        let template = RecordTemplate {
            window_size: config.analyzer.window_size,
            breaker: config.breaker.clone(),
            constraints: config.constraints.clone(),
        };
        let store = RegistryStore::new(&config.registry.path);
        let backups = BackupManager::new(&config.registry.backup_dir, config.registry.retention_days);
        let now = clock.now();

        let loaded = load_registry(&store, &backups, &template, &alerts, now);
        let snapshot = loaded.snapshot;
        let migrated_from = snapshot.migrated_from;

        let records: DashMap<String, RecordHandle> = snapshot
            .records
            .into_iter()
            .map(|(name, record)| (name, Arc::new(Mutex::new(record))))
            .collect();

        let gate = ValidationGate {
            analyzer: PerformanceAnalyzer::new(config.analyzer.clone()),
            template,
            clock,
            fingerprints: FingerprintComputer::new(),
            global: RwLock::new(GlobalState {
                approved: snapshot.approved,
                emergency: snapshot.emergency,
                failover: snapshot.failover,
                violations: Vec::new(),
            }),
            records,
            store,
            backups,
            persist_lock: Mutex::new(()),
            unsaved_changes: AtomicBool::new(false),
            quota: DailyQuota::restore(snapshot.quota),
            alerts,
            metrics,
            restored_from: loaded.restored_from.clone(),
            tasks: Mutex::new(None),
            config,
        };

        if let Some(reason) = loaded.failover_reason {
            gate.fail_over(&reason);
        }
        gate.run_integrity_check();

        info!(
            "Validation gate opened: {} strategies, {} approved, healthy={}",
            gate.records.len(),
            gate.global.read().approved.len(),
            gate.global.read().healthy()
        );

        if let Some(version) = migrated_from {
            warn!(
                "Registry migrated from format v{} to v{}",
                version, CURRENT_FORMAT_VERSION
            );
        }
        if (loaded.restored_from.is_some() || migrated_from.is_some()) && gate.is_healthy() {
            // Write the restored or migrated state back with a fresh checksum
            gate.persist()?;
        } else {
            gate.refresh_gauges(&gate.snapshot());
        }

        Ok(gate)
    }
}

struct LoadedRegistry {
    snapshot: RegistrySnapshot,
    restored_from: Option<PathBuf>,
    failover_reason: Option<String>,
}

fn load_registry(
    store: &RegistryStore,
    backups: &BackupManager,
    template: &RecordTemplate,
    alerts: &AlertManager,
    now: DateTime<Utc>,
) -> LoadedRegistry {
    let primary_error = match store.load(template, now) {
        Ok(Some(snapshot)) => {
            return LoadedRegistry {
                snapshot,
                restored_from: None,
                failover_reason: None,
            }
        }
        Ok(None) => None,
        Err(e) => {
            error!("Primary registry unusable: {}", e);
            if let Some(moved) = store.quarantine_corrupt(now) {
                warn!("Unusable registry moved aside to {:?}", moved);
            }
            Some(e.to_string())
        }
    };

    match backups.latest_valid(template, now) {
        Ok(Some((entry, snapshot))) => {
            let message = match &primary_error {
                Some(e) => format!("Primary registry unusable ({}), restored from backup", e),
                None => "Primary registry missing, restored from backup".to_string(),
            };
            warn!("{} {:?}", message, entry.path);
            alerts.send(
                Alert::new(
                    AlertCategory::Registry,
                    "registry_restored_from_backup",
                    AlertSeverity::Critical,
                    message,
                )
                .with_detail("backup", entry.path.display())
                .with_detail("taken_at", entry.taken_at)
                .at(now),
            );
            LoadedRegistry {
                snapshot,
                restored_from: Some(entry.path),
                failover_reason: None,
            }
        }
        Ok(None) | Err(_) if primary_error.is_none() => {
            info!("No registry found, starting empty");
            LoadedRegistry {
                snapshot: RegistrySnapshot::empty(now),
                restored_from: None,
                failover_reason: None,
            }
        }
        other => {
            if let Err(e) = other {
                error!("Backup directory unusable: {}", e);
            }
            LoadedRegistry {
                snapshot: RegistrySnapshot::empty(now),
                restored_from: None,
                failover_reason: Some(format!(
                    "registry unusable and no valid backup: {}",
                    primary_error.unwrap_or_default()
                )),
            }
        }
    }
}

/// The validation gate service
pub struct ValidationGate {
    config: GateConfig,
    template: RecordTemplate,
    clock: Arc<dyn Clock>,
    fingerprints: FingerprintComputer,
    analyzer: PerformanceAnalyzer,
    global: RwLock<GlobalState>,
    records: DashMap<String, RecordHandle>,
    store: RegistryStore,
    backups: BackupManager,
    persist_lock: Mutex<()>,
    /// In-memory changes made by gate checks, written by the next persist
    unsaved_changes: AtomicBool,
    quota: DailyQuota,
    alerts: Arc<AlertManager>,
    metrics: Arc<MetricsRegistry>,
    restored_from: Option<PathBuf>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl ValidationGate {
    pub fn builder(config: GateConfig) -> GateBuilder {
        GateBuilder {
            config,
            clock: None,
            sinks: Vec::new(),
            metrics: None,
        }
    }

    /// Open with the system clock and configured alert outputs
    pub fn open(config: GateConfig) -> Result<Self, GateError> {
        Self::builder(config).open()
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Attach (or replace) a strategy's definition; the cached fingerprint is dropped
    pub fn attach_definition(&self, definition: Arc<dyn StrategyDefinition>) {
        self.fingerprints.attach(definition);
    }

    /// Rehash a strategy's definition, e.g. after a strategy reload
    ///
    /// The digest is cached outside the gate's locks, so the next check only
    /// compares it with the validated one.
    pub fn refresh_fingerprint(&self, name: &str) {
        if let Err(e) = self.fingerprints.recompute(name) {
            warn!("Fingerprint refresh for '{}' failed: {}", name, e);
        }
    }

    fn record_handle(&self, name: &str) -> Result<RecordHandle, ValidationError> {
        self.records
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| ValidationError::UnknownStrategy(name.to_string()))
    }

    fn require_actor(actor: &str, subject: &str) -> Result<(), ValidationError> {
        if actor.trim().is_empty() {
            return Err(ValidationError::MissingActor(subject.to_string()));
        }
        Ok(())
    }

    fn alert(&self, alert: Alert) {
        self.alerts.send(alert.at(self.clock.now()));
    }

    // ------------------------------------------------------------------
    // Gate check
    // ------------------------------------------------------------------

    /// Decide whether `name` may emit live output right now
    pub fn can_generate_recommendations(&self, name: &str) -> GateDecision {
        let started = Instant::now();
        let decision = self.evaluate(name);

        let gate_metrics = self.metrics.gate();
        gate_metrics
            .decisions_total
            .with_label_values(&[decision.outcome_label(), decision.category_label()])
            .inc();
        gate_metrics
            .check_latency_us
            .observe(started.elapsed().as_secs_f64() * 1_000_000.0);

        if !decision.allowed {
            debug!("{}", decision);
        }
        decision
    }

    /// Shorthand for [`Self::can_generate_recommendations`]
    pub fn check(&self, name: &str) -> GateDecision {
        self.can_generate_recommendations(name)
    }

    fn evaluate(&self, name: &str) -> GateDecision {
        let now = self.clock.now();
        // Hashed before any lock is taken; a cache hit costs a map lookup
        let fingerprint = self.fingerprints.current(name);
        let global = self.global.read();

        if global.emergency.kill_switch_active {
            return GateDecision::deny(
                name,
                DenialCategory::Emergency,
                format!(
                    "kill switch active: {}",
                    global.emergency.reason.as_deref().unwrap_or("no reason given")
                ),
                now,
            );
        }

        if let Some(failover) = &global.failover {
            return GateDecision::deny(
                name,
                DenialCategory::RegistryUnhealthy,
                format!("registry in failover mode: {}", failover.reason),
                now,
            );
        }

        let handle = match self.records.get(name) {
            Some(r) => Arc::clone(r.value()),
            None => {
                return GateDecision::deny(
                    name,
                    DenialCategory::UnknownStrategy,
                    "strategy is not registered",
                    now,
                )
                .requiring_validation(true)
            }
        };

        let current = match fingerprint {
            Ok(fp) => fp,
            Err(e) => {
                warn!("Gate cannot verify '{}': {}", name, e);
                return GateDecision::deny(
                    name,
                    DenialCategory::FingerprintUnavailable,
                    e.to_string(),
                    now,
                );
            }
        };

        let record = handle.lock();

        if record.fingerprint() != current {
            let validated = record.fingerprint();
            drop(record);
            drop(global);
            warn!(
                "Fingerprint mismatch for '{}' at gate check ({} != {})",
                name,
                current.short(),
                validated.short()
            );
            // Applied in memory only; the monitor cycle writes it out
            if self.apply_code_change(name, &handle, current) {
                self.unsaved_changes.store(true, Ordering::Release);
            }
            return GateDecision::deny(
                name,
                DenialCategory::CodeChangeDetected,
                format!(
                    "strategy definition changed since validation ({} -> {})",
                    validated.short(),
                    current.short()
                ),
                now,
            )
            .requiring_validation(true)
            .with_code_change();
        }

        let status = record.status();

        if global.emergency.is_suspended(name)
            || status == ValidationStatus::EmergencySuspended
        {
            let reason = global
                .emergency
                .suspended
                .get(name)
                .map(|s| format!("emergency suspension by {}: {}", s.by, s.reason))
                .unwrap_or_else(|| "emergency suspended".to_string());
            return GateDecision::deny(name, DenialCategory::Emergency, reason, now)
                .requiring_manual_override();
        }

        if status == ValidationStatus::CircuitBreakerOpen
            || record.circuit_breaker.is_open()
        {
            let breaker = &record.circuit_breaker;
            return GateDecision::deny(
                name,
                DenialCategory::CircuitBreakerOpen,
                format!(
                    "circuit breaker {}: {}",
                    breaker.phase,
                    breaker.last_trip_reason.as_deref().unwrap_or("tripped")
                ),
                now,
            )
            .recoverable(breaker.timeout_elapsed(now));
        }

        if !status.is_approvable() || !global.approved.contains(name) {
            let decision = GateDecision::deny(
                name,
                DenialCategory::NotApproved,
                format!("status {} is not approved for live output", status),
                now,
            )
            .requiring_validation(status == ValidationStatus::Unvalidated);
            return if status == ValidationStatus::Quarantined {
                decision.requiring_manual_override()
            } else {
                decision
            };
        }

        GateDecision::allow(name, record.constraints.clone(), now)
    }

    /// Gate check plus consumption of one unit of the daily budget
    pub fn authorize_recommendation(&self, name: &str) -> GateDecision {
        let decision = self.can_generate_recommendations(name);
        if !decision.allowed {
            return decision;
        }

        let limit = decision
            .constraints
            .as_ref()
            .map(|c| c.max_daily_recommendations)
            .unwrap_or(0);
        let now = decision.decided_at;

        match self.quota.try_consume(name, limit, now.date_naive()) {
            Ok(remaining) => {
                self.metrics
                    .gate()
                    .quota_consumed_total
                    .with_label_values(&[name])
                    .inc();
                if let Err(e) = self.persist() {
                    warn!("Quota usage for '{}' not persisted: {}", name, e);
                }
                decision.with_quota_remaining(remaining)
            }
            Err(used) => {
                self.alert(
                    Alert::new(
                        AlertCategory::Quota,
                        "daily_quota_exhausted",
                        AlertSeverity::Info,
                        format!("Daily recommendation budget of {} used up", limit),
                    )
                    .for_strategy(name)
                    .with_detail("used", used),
                );
                let denied = GateDecision::deny(
                    name,
                    DenialCategory::QuotaExhausted,
                    format!("daily quota exhausted ({}/{})", used, limit),
                    now,
                )
                .with_quota_remaining(0);
                self.metrics
                    .gate()
                    .decisions_total
                    .with_label_values(&[denied.outcome_label(), denied.category_label()])
                    .inc();
                denied
            }
        }
    }

    /// Recommendations authorized today
    pub fn quota_used(&self, name: &str) -> u32 {
        self.quota.used(name, self.clock.now().date_naive())
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn record(&self, name: &str) -> Option<ValidationRecord> {
        self.records.get(name).map(|r| r.value().lock().clone())
    }

    pub fn strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn approved_strategies(&self) -> Vec<String> {
        self.global.read().approved.iter().cloned().collect()
    }

    pub fn is_approved(&self, name: &str) -> bool {
        self.global.read().approved.contains(name)
    }

    pub fn is_healthy(&self) -> bool {
        self.global.read().healthy()
    }

    pub fn kill_switch_active(&self) -> bool {
        self.global.read().emergency.kill_switch_active
    }

    pub fn emergency_controls(&self) -> crate::resilience::EmergencyControls {
        self.global.read().emergency.clone()
    }

    pub fn health(&self) -> RegistryHealth {
        let global = self.global.read();
        let mut counts_by_status = BTreeMap::new();
        let mut open_breakers = Vec::new();

        for handle in self.handles() {
            let record = handle.lock();
            *counts_by_status
                .entry(record.status().as_str().to_string())
                .or_insert(0) += 1;
            if record.circuit_breaker.is_open() {
                open_breakers.push(record.strategy_name.clone());
            }
        }
        open_breakers.sort();

        RegistryHealth {
            healthy: global.healthy(),
            failover_reason: global.failover.as_ref().map(|f| f.reason.clone()),
            failover_since: global.failover.as_ref().map(|f| f.since),
            violations: global.violations.iter().map(|v| v.to_string()).collect(),
            kill_switch_active: global.emergency.kill_switch_active,
            kill_switch_by: global
                .emergency
                .kill_switch_active
                .then(|| global.emergency.activated_by.clone())
                .flatten(),
            emergency_suspensions: global.emergency.suspended.keys().cloned().collect(),
            approved_count: global.approved.len(),
            total_strategies: self.records.len(),
            counts_by_status,
            open_breakers,
            restored_from_backup: self.restored_from.clone(),
        }
    }

    fn handles(&self) -> Vec<RecordHandle> {
        self.records.iter().map(|r| Arc::clone(r.value())).collect()
    }

    // ------------------------------------------------------------------
    // Integrity and failover
    // ------------------------------------------------------------------

    fn records_snapshot(&self) -> BTreeMap<String, ValidationRecord> {
        self.records
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect::<Vec<_>>()
            .into_iter()
            .map(|(name, handle)| {
                let record = handle.lock().clone();
                (name, record)
            })
            .collect()
    }

    fn run_integrity_check(&self) {
        let mut global = self.global.write();
        let records = self.records_snapshot();
        let violations = integrity::check(&global.approved, &records, &global.emergency);
        if violations.is_empty() {
            return;
        }

        for violation in &violations {
            error!("Registry integrity violation: {}", violation);
        }
        let reason = format!("{} integrity violation(s) at startup", violations.len());
        global.violations = violations;
        let newly = global.enter_failover(&reason, self.clock.now());
        drop(global);
        if newly {
            self.announce_failover(&reason);
        }
    }

    /// Enter failover: unhealthy, approved set empty, every decision blocked
    fn fail_over(&self, reason: &str) {
        let newly = self.global.write().enter_failover(reason, self.clock.now());
        if newly {
            self.announce_failover(reason);
        }
    }

    fn announce_failover(&self, reason: &str) {
        error!("🚨 Registry entering FAILOVER mode: {}", reason);
        let persistence = self.metrics.persistence();
        persistence.failovers_total.inc();
        persistence.registry_healthy.set(0);
        self.metrics.lifecycle().approved_strategies.set(0);
        self.alert(
            Alert::new(
                AlertCategory::Registry,
                "registry_failover",
                AlertSeverity::Critical,
                "Registry unhealthy, all gate decisions blocked",
            )
            .with_detail("reason", reason),
        );
    }

    /// Re-run the integrity check and leave failover if it passes
    pub fn restore_health(&self, by: &str) -> Result<RestoreOutcome, GateError> {
        Self::require_actor(by, "restore_health")?;

        let outcome = {
            let mut global = self.global.write();
            if global.healthy() {
                return Ok(RestoreOutcome::AlreadyHealthy);
            }

            let records = self.records_snapshot();
            let rebuilt: BTreeSet<String> = records
                .values()
                .filter(|r| r.is_approvable() && !global.emergency.blocks(&r.strategy_name))
                .map(|r| r.strategy_name.clone())
                .collect();

            let violations = integrity::check(&rebuilt, &records, &global.emergency);
            if !violations.is_empty() {
                global.violations = violations.clone();
                RestoreOutcome::StillUnhealthy(violations)
            } else {
                global.failover = None;
                global.violations.clear();
                global.approved = rebuilt;
                RestoreOutcome::Restored {
                    approved: global.approved.iter().cloned().collect(),
                }
            }
        };

        match &outcome {
            RestoreOutcome::Restored { approved } => {
                info!(
                    "Registry health restored by {}, {} strategies re-approved",
                    by,
                    approved.len()
                );
                self.metrics.persistence().registry_healthy.set(1);
                self.alert(
                    Alert::new(
                        AlertCategory::Registry,
                        "registry_restored",
                        AlertSeverity::Warning,
                        "Registry health restored",
                    )
                    .with_detail("by", by)
                    .with_detail("approved", approved.len()),
                );
                self.persist()?;
            }
            RestoreOutcome::StillUnhealthy(violations) => {
                warn!(
                    "Health restore by {} refused: {} violation(s) remain",
                    by,
                    violations.len()
                );
            }
            RestoreOutcome::AlreadyHealthy => {}
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Current state as a snapshot
    pub fn snapshot(&self) -> RegistrySnapshot {
        let global = self.global.read();
        RegistrySnapshot {
            format_version: CURRENT_FORMAT_VERSION,
            saved_at: self.clock.now(),
            approved: global.approved.clone(),
            emergency: global.emergency.clone(),
            failover: global.failover.clone(),
            records: self.records_snapshot(),
            quota: self.quota.snapshot(self.clock.now().date_naive()),
            migrated_from: None,
        }
    }

    /// Synchronously write the primary registry
    ///
    /// A failure here means the registry can no longer be trusted and
    /// escalates to failover.
    pub fn persist(&self) -> Result<(), GateError> {
        let _guard = self.persist_lock.lock();
        self.unsaved_changes.store(false, Ordering::Release);
        let snapshot = self.snapshot();
        self.refresh_gauges(&snapshot);

        match self.store.save(&snapshot) {
            Ok(()) => {
                self.metrics
                    .persistence()
                    .persists_total
                    .with_label_values(&["ok"])
                    .inc();
                Ok(())
            }
            Err(e) => {
                self.metrics
                    .persistence()
                    .persists_total
                    .with_label_values(&["error"])
                    .inc();
                error!("Registry persist failed: {}", e);
                if e.is_trust_breaking() {
                    self.fail_over(&format!("primary persist failed: {}", e));
                } else {
                    self.alert(Alert::new(
                        AlertCategory::Registry,
                        "persist_failed",
                        AlertSeverity::Error,
                        format!("Registry persist failed: {}", e),
                    ));
                }
                Err(e.into())
            }
        }
    }

    /// Whether a gate check changed state that has not been persisted yet
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved_changes.load(Ordering::Acquire)
    }

    /// Write a full-snapshot backup now
    pub fn backup_now(&self) -> Result<PathBuf, GateError> {
        let snapshot = self.snapshot();
        match self.backups.backup(&snapshot, self.clock.now()) {
            Ok(path) => {
                self.metrics
                    .persistence()
                    .backups_total
                    .with_label_values(&["ok"])
                    .inc();
                Ok(path)
            }
            Err(e) => {
                self.metrics
                    .persistence()
                    .backups_total
                    .with_label_values(&["error"])
                    .inc();
                error!("Registry backup failed: {}", e);
                self.alert(
                    Alert::new(
                        AlertCategory::Registry,
                        "backup_failed",
                        AlertSeverity::Error,
                        format!("Registry backup failed: {}", e),
                    )
                    .with_detail("dir", self.backups.dir().display()),
                );
                Err(e.into())
            }
        }
    }

    fn refresh_gauges(&self, snapshot: &RegistrySnapshot) {
        let lifecycle = self.metrics.lifecycle();
        lifecycle.approved_strategies.set(snapshot.approved.len() as i64);
        lifecycle
            .kill_switch_active
            .set(snapshot.emergency.kill_switch_active as i64);

        let mut counts = BTreeMap::new();
        for record in snapshot.records.values() {
            *counts.entry(record.status()).or_insert(0i64) += 1;
        }
        lifecycle.set_status_counts(&counts);

        self.metrics
            .persistence()
            .registry_healthy
            .set(snapshot.failover.is_none() as i64);
    }
}

impl HealthReporter for ValidationGate {
    fn healthy(&self) -> bool {
        self.is_healthy()
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(self.health()).unwrap_or_else(|e| {
            serde_json::json!({ "healthy": self.is_healthy(), "error": e.to_string() })
        })
    }
}
