//! Prometheus metrics for the validation gate
//!
//! Provides metrics for:
//! - Gate decisions (allowed/denied by category, check latency)
//! - Strategy lifecycle (approved set size, statuses, breaker trips)
//! - Monitor cycles (duration, per-strategy failures)
//! - Registry health (persists, failovers, backups)

use crate::core::ValidationStatus;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Arc;
use tracing::info;

/// Central registry for all Prometheus metrics
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    gate: Arc<GateMetrics>,
    lifecycle: Arc<LifecycleMetrics>,
    monitor: Arc<MonitorMetrics>,
    persistence: Arc<PersistenceMetrics>,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metric families
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let gate = Arc::new(GateMetrics::new(&registry)?);
        let lifecycle = Arc::new(LifecycleMetrics::new(&registry)?);
        let monitor = Arc::new(MonitorMetrics::new(&registry)?);
        let persistence = Arc::new(PersistenceMetrics::new(&registry)?);

        info!("Prometheus metrics registry initialized");

        Ok(Self {
            registry,
            gate,
            lifecycle,
            monitor,
            persistence,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gate(&self) -> &GateMetrics {
        &self.gate
    }

    pub fn lifecycle(&self) -> &LifecycleMetrics {
        &self.lifecycle
    }

    pub fn monitor(&self) -> &MonitorMetrics {
        &self.monitor
    }

    pub fn persistence(&self) -> &PersistenceMetrics {
        &self.persistence
    }
}

impl Default for MetricsRegistry {
    #[allow(clippy::panic)] // Critical infrastructure - must succeed or abort
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("FATAL: Failed to create metrics registry: {}", e);
            panic!("Critical: Cannot create metrics registry")
        })
    }
}

/// Gate check metrics
pub struct GateMetrics {
    /// Decisions by outcome ("allowed"/"denied") and denial category
    pub decisions_total: IntCounterVec,
    /// Gate check latency in microseconds
    pub check_latency_us: Histogram,
    /// Recommendations consumed against the daily quota
    pub quota_consumed_total: IntCounterVec,
}

impl GateMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let decisions_total = IntCounterVec::new(
            Opts::new("gate_decisions_total", "Gate decisions by outcome").namespace("warden"),
            &["outcome", "category"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let check_latency_us = Histogram::with_opts(
            HistogramOpts::new(
                "warden_gate_check_latency_us",
                "Gate check latency in microseconds",
            )
            .buckets(vec![1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0]),
        )?;
        registry.register(Box::new(check_latency_us.clone()))?;

        let quota_consumed_total = IntCounterVec::new(
            Opts::new(
                "gate_quota_consumed_total",
                "Recommendations authorized against the daily quota",
            )
            .namespace("warden"),
            &["strategy"],
        )?;
        registry.register(Box::new(quota_consumed_total.clone()))?;

        Ok(Self {
            decisions_total,
            check_latency_us,
            quota_consumed_total,
        })
    }
}

/// Strategy lifecycle metrics
pub struct LifecycleMetrics {
    /// Size of the approved set
    pub approved_strategies: IntGauge,
    /// Registered strategies per status
    pub strategies_by_status: IntGaugeVec,
    /// Status transitions by target status
    pub transitions_total: IntCounterVec,
    pub breaker_trips_total: IntCounterVec,
    pub breaker_recoveries_total: IntCounterVec,
    /// Code changes that reset a strategy to UNVALIDATED
    pub code_changes_total: IntCounterVec,
    /// 1 while the global kill switch is active
    pub kill_switch_active: IntGauge,
}

impl LifecycleMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let approved_strategies = IntGauge::new(
            "warden_approved_strategies",
            "Strategies currently in the approved set",
        )?;
        registry.register(Box::new(approved_strategies.clone()))?;

        let strategies_by_status = IntGaugeVec::new(
            Opts::new("strategies_by_status", "Registered strategies per status")
                .namespace("warden"),
            &["status"],
        )?;
        registry.register(Box::new(strategies_by_status.clone()))?;

        let transitions_total = IntCounterVec::new(
            Opts::new("status_transitions_total", "Status transitions by target")
                .namespace("warden"),
            &["to"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let breaker_trips_total = IntCounterVec::new(
            Opts::new("breaker_trips_total", "Circuit breaker trips").namespace("warden"),
            &["strategy"],
        )?;
        registry.register(Box::new(breaker_trips_total.clone()))?;

        let breaker_recoveries_total = IntCounterVec::new(
            Opts::new("breaker_recoveries_total", "Circuit breaker recoveries")
                .namespace("warden"),
            &["strategy"],
        )?;
        registry.register(Box::new(breaker_recoveries_total.clone()))?;

        let code_changes_total = IntCounterVec::new(
            Opts::new("code_changes_total", "Detected strategy definition changes")
                .namespace("warden"),
            &["strategy"],
        )?;
        registry.register(Box::new(code_changes_total.clone()))?;

        let kill_switch_active =
            IntGauge::new("warden_kill_switch_active", "1 while the kill switch is active")?;
        registry.register(Box::new(kill_switch_active.clone()))?;

        Ok(Self {
            approved_strategies,
            strategies_by_status,
            transitions_total,
            breaker_trips_total,
            breaker_recoveries_total,
            code_changes_total,
            kill_switch_active,
        })
    }

    /// Overwrite the per-status gauges from a full count
    pub fn set_status_counts<'a>(
        &self,
        counts: impl IntoIterator<Item = (&'a ValidationStatus, &'a i64)>,
    ) {
        for status in ValidationStatus::ALL {
            self.strategies_by_status
                .with_label_values(&[status.as_str()])
                .set(0);
        }
        for (status, count) in counts {
            self.strategies_by_status
                .with_label_values(&[status.as_str()])
                .set(*count);
        }
    }
}

/// Monitor cycle metrics
pub struct MonitorMetrics {
    /// Completed cycles by result ("ok", "partial", "skipped")
    pub cycles_total: IntCounterVec,
    /// Cycle duration in milliseconds
    pub cycle_duration_ms: Histogram,
    /// Per-strategy evaluation failures
    pub strategy_failures_total: IntCounterVec,
    /// Degradation assessments by level
    pub degradations_total: IntCounterVec,
}

impl MonitorMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let cycles_total = IntCounterVec::new(
            Opts::new("monitor_cycles_total", "Monitor cycles by result").namespace("warden"),
            &["result"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let cycle_duration_ms = Histogram::with_opts(
            HistogramOpts::new(
                "warden_monitor_cycle_duration_ms",
                "Monitor cycle duration in milliseconds",
            )
            .buckets(vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]),
        )?;
        registry.register(Box::new(cycle_duration_ms.clone()))?;

        let strategy_failures_total = IntCounterVec::new(
            Opts::new(
                "monitor_strategy_failures_total",
                "Strategies whose evaluation failed during a cycle",
            )
            .namespace("warden"),
            &["strategy"],
        )?;
        registry.register(Box::new(strategy_failures_total.clone()))?;

        let degradations_total = IntCounterVec::new(
            Opts::new("monitor_degradations_total", "Degradation assessments by level")
                .namespace("warden"),
            &["level"],
        )?;
        registry.register(Box::new(degradations_total.clone()))?;

        Ok(Self {
            cycles_total,
            cycle_duration_ms,
            strategy_failures_total,
            degradations_total,
        })
    }
}

/// Registry persistence metrics
pub struct PersistenceMetrics {
    /// Writes by result ("ok", "error")
    pub persists_total: IntCounterVec,
    /// Backups by result ("ok", "error")
    pub backups_total: IntCounterVec,
    /// Entries into failover mode
    pub failovers_total: IntCounter,
    /// 1 while the registry is healthy
    pub registry_healthy: IntGauge,
}

impl PersistenceMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let persists_total = IntCounterVec::new(
            Opts::new("registry_persists_total", "Registry writes by result").namespace("warden"),
            &["result"],
        )?;
        registry.register(Box::new(persists_total.clone()))?;

        let backups_total = IntCounterVec::new(
            Opts::new("registry_backups_total", "Registry backups by result").namespace("warden"),
            &["result"],
        )?;
        registry.register(Box::new(backups_total.clone()))?;

        let failovers_total = IntCounter::new(
            "warden_registry_failovers_total",
            "Times the registry entered failover mode",
        )?;
        registry.register(Box::new(failovers_total.clone()))?;

        let registry_healthy =
            IntGauge::new("warden_registry_healthy", "1 while the registry is healthy")?;
        registry.register(Box::new(registry_healthy.clone()))?;

        Ok(Self {
            persists_total,
            backups_total,
            failovers_total,
            registry_healthy,
        })
    }
}
