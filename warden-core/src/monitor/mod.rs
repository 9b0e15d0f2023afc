//! Periodic re-evaluation of approved strategies
//!
//! One cycle, for every approved strategy:
//! 1. pull new outcomes from the feed
//! 2. `detect_modification`; a changed strategy is skipped for the rest of the cycle
//! 3. ingest the outcomes and analyze the live window
//! 4. route the assessment (breaker trip, quarantine, degradation alert)
//!
//! Every cycle, skipped or not, first auto-resolves alerts that have gone
//! quiet. A cycle that runs ends by persisting, which also writes out code
//! changes that gate checks applied in memory.
//!
//! Strategies with an open breaker get a recovery pass that feeds their
//! outcomes into probation. Each strategy's result is collected into the
//! [`CycleReport`]; a failure is isolated to its strategy and only the
//! aggregate count is escalated as an alert.

pub mod feed;

pub use feed::{JsonlOutcomeFeed, MemoryFeed, OutcomeFeed};

use crate::core::LiveOutcome;
use crate::gate::{AssessmentAction, ValidationGate};
use crate::monitoring::{Alert, AlertCategory, AlertSeverity};
use crate::resilience::BreakerEvent;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Why a cycle did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    KillSwitchActive,
    RegistryUnhealthy,
}

/// What the cycle did for one strategy
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorAction {
    /// Code changed; outcomes from this poll were discarded
    CodeChanged,
    Assessed(AssessmentAction),
    /// Breaker open: outcomes fed into probation
    Probation(BreakerEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReport {
    pub strategy: String,
    pub ingested: usize,
    pub action: MonitorAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyFailure {
    pub strategy: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub skipped: Option<SkipReason>,
    pub reports: Vec<StrategyReport>,
    pub failures: Vec<StrategyFailure>,
    /// Quiet alerts auto-resolved at the start of the cycle
    pub alerts_resolved: usize,
    pub duration: Duration,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            skipped: None,
            reports: Vec::new(),
            failures: Vec::new(),
            alerts_resolved: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn report_for(&self, strategy: &str) -> Option<&StrategyReport> {
        self.reports.iter().find(|r| r.strategy == strategy)
    }

    fn result_label(&self) -> &'static str {
        match (self.skipped, self.failures.is_empty()) {
            (Some(_), _) => "skipped",
            (None, true) => "ok",
            (None, false) => "partial",
        }
    }
}

impl ValidationGate {
    /// Run one monitor cycle against `feed`
    pub fn run_monitor_cycle(&self, feed: &dyn OutcomeFeed) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::new(self.now());
        report.alerts_resolved = self.alerts().cleanup_old_alerts(report.started_at);

        report.skipped = if self.kill_switch_active() {
            Some(SkipReason::KillSwitchActive)
        } else if !self.is_healthy() {
            Some(SkipReason::RegistryUnhealthy)
        } else {
            None
        };

        if let Some(reason) = report.skipped {
            debug!("Monitor cycle skipped: {:?}", reason);
        } else {
            for name in self.approved_strategies() {
                match self.monitor_strategy(&name, feed) {
                    Ok(r) => report.reports.push(r),
                    Err(e) => self.isolate_failure(&mut report, name, e),
                }
            }

            for name in self.health().open_breakers {
                if report.report_for(&name).is_some() {
                    continue;
                }
                match self.recover_strategy(&name, feed) {
                    Ok(r) => report.reports.push(r),
                    Err(e) => self.isolate_failure(&mut report, name, e),
                }
            }

            if !report.failures.is_empty() {
                let names: Vec<&str> = report.failures.iter().map(|f| f.strategy.as_str()).collect();
                self.alerts().send(
                    Alert::new(
                        AlertCategory::Monitor,
                        "monitor_cycle_failures",
                        AlertSeverity::Error,
                        format!(
                            "{} strategies failed in monitor cycle",
                            report.failures.len()
                        ),
                    )
                    .with_detail("strategies", names.join(","))
                    .at(self.now()),
                );
            }

            if let Err(e) = self.persist() {
                error!("Persist after monitor cycle failed: {}", e);
            }
        }

        report.duration = started.elapsed();
        let monitor = self.metrics().monitor();
        monitor
            .cycles_total
            .with_label_values(&[report.result_label()])
            .inc();
        monitor
            .cycle_duration_ms
            .observe(report.duration.as_secs_f64() * 1000.0);

        if report.skipped.is_none() {
            info!(
                "Monitor cycle: {} strategies checked, {} failures in {:?}",
                report.reports.len(),
                report.failures.len(),
                report.duration
            );
        }
        report
    }

    fn isolate_failure(&self, report: &mut CycleReport, strategy: String, error: anyhow::Error) {
        warn!("Monitor check failed for '{}': {:#}", strategy, error);
        self.metrics()
            .monitor()
            .strategy_failures_total
            .with_label_values(&[strategy.as_str()])
            .inc();
        report.failures.push(StrategyFailure {
            strategy,
            error: format!("{:#}", error),
        });
    }

    fn monitor_strategy(&self, name: &str, feed: &dyn OutcomeFeed) -> anyhow::Result<StrategyReport> {
        let samples = feed.poll(name)?;

        if self.detect_modification(name)? {
            return Ok(StrategyReport {
                strategy: name.to_string(),
                ingested: 0,
                action: MonitorAction::CodeChanged,
            });
        }

        let ingested = samples.len();
        for sample in samples {
            self.record_outcome(&LiveOutcome {
                strategy_name: name.to_string(),
                sample,
            })?;
        }

        let action = self.assess(name)?;
        Ok(StrategyReport {
            strategy: name.to_string(),
            ingested,
            action: MonitorAction::Assessed(action),
        })
    }

    fn recover_strategy(&self, name: &str, feed: &dyn OutcomeFeed) -> anyhow::Result<StrategyReport> {
        let samples = feed.poll(name)?;
        let ingested = samples.len();

        // Time-driven transitions first so a win after the timeout counts toward probation
        let mut last = self.poll_breaker(name)?;
        for sample in samples {
            let event = self.record_outcome(&LiveOutcome {
                strategy_name: name.to_string(),
                sample,
            })?;
            if event != BreakerEvent::Unchanged {
                last = event;
            }
        }

        Ok(StrategyReport {
            strategy: name.to_string(),
            ingested,
            action: MonitorAction::Probation(last),
        })
    }
}
