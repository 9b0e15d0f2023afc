//! Strategy lifecycle operations on the gate
//!
//! Registration, code-change detection, status promotion, backtest
//! results, live outcomes and the breaker/quarantine responses to
//! degradation. Every mutation persists before returning, except a code
//! change caught by a gate check, which the next monitor cycle writes out.

use super::{GlobalState, RecordHandle, ValidationGate};
use crate::analysis::{AnalysisOutcome, BreakerTrigger, DegradationLevel, PerformanceAssessment};
use crate::core::{
    BacktestResult, GateError, LiveOutcome, OperationalConstraints, TransitionKind,
    ValidationError, ValidationStatus,
};
use crate::fingerprint::{Fingerprint, StrategyDefinition};
use crate::monitoring::{Alert, AlertCategory, AlertSeverity};
use crate::registry::ValidationRecord;
use crate::resilience::BreakerEvent;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SYSTEM_ACTOR: &str = "system";
const BREAKER_ACTOR: &str = "circuit-breaker";
const MONITOR_ACTOR: &str = "performance-monitor";

/// What the gate did with one performance assessment
#[derive(Debug, Clone, PartialEq)]
pub enum AssessmentAction {
    InsufficientData { samples: usize, required: usize },
    /// Level unchanged since the last logged alert
    Steady(DegradationLevel),
    LevelChanged {
        from: DegradationLevel,
        to: DegradationLevel,
    },
    BreakerTripped(BreakerTrigger),
    Quarantined,
}

impl ValidationGate {
    /// Create an UNVALIDATED record for `name`; returns the existing one if present
    ///
    /// The strategy's definition must already be attached so its fingerprint
    /// can be computed.
    pub fn register(&self, name: &str) -> Result<ValidationRecord, GateError> {
        if let Some(existing) = self.record(name) {
            return Ok(existing);
        }

        let fingerprint = self.fingerprints.current(name)?;
        let now = self.clock.now();

        let created = match self.records.entry(name.to_string()) {
            Entry::Occupied(entry) => return Ok(entry.get().lock().clone()),
            Entry::Vacant(entry) => {
                let record =
                    ValidationRecord::new(name, fingerprint, &self.template, SYSTEM_ACTOR, now);
                entry.insert(Arc::new(Mutex::new(record.clone())));
                record
            }
        };

        info!(
            "Registered strategy '{}' ({}) as {}",
            name,
            created.current_version.version_id,
            created.status()
        );
        self.persist()?;
        Ok(created)
    }

    /// Attach the definition and register it
    pub fn register_strategy(
        &self,
        definition: Arc<dyn StrategyDefinition>,
    ) -> Result<ValidationRecord, GateError> {
        let name = definition.name().to_string();
        self.fingerprints.attach(definition);
        self.register(&name)
    }

    /// Recompute the fingerprint and compare it with the validated one
    ///
    /// On a change the current version is archived, a new UNVALIDATED
    /// version takes its place and the strategy leaves the approved set.
    /// Idempotent: a second call with the same code returns `false`.
    pub fn detect_modification(&self, name: &str) -> Result<bool, GateError> {
        let handle = self.record_handle(name)?;
        let current = self.fingerprints.recompute(name)?;
        let changed = self.apply_code_change(name, &handle, current);
        if changed {
            self.persist()?;
        }
        Ok(changed)
    }

    /// In-memory half of [`Self::detect_modification`]; the caller persists
    pub(super) fn apply_code_change(
        &self,
        name: &str,
        handle: &RecordHandle,
        current: Fingerprint,
    ) -> bool {
        let now = self.clock.now();

        let change = {
            let mut global = self.global.write();
            let mut record = handle.lock();
            let validated = record.fingerprint();
            if validated == current {
                None
            } else {
                let from_status = record.status();
                let superseded = record.current_version.version_id.clone();
                record.replace_fingerprint(current, SYSTEM_ACTOR, now);
                global.approved.remove(name);
                // The suspended code is gone; the new version must pass validation anyway
                let lifted = global.emergency.clear_suspension(
                    name,
                    SYSTEM_ACTOR,
                    &format!("code change superseded {}", superseded),
                    now,
                );
                Some((
                    validated,
                    from_status,
                    superseded,
                    record.current_version.version_id.clone(),
                    lifted,
                ))
            }
        };

        let Some((validated, from_status, superseded, version_id, lifted)) = change else {
            return false;
        };

        warn!(
            "Code change detected for '{}': {} -> {}, {} superseded by {}",
            name,
            validated.short(),
            current.short(),
            superseded,
            version_id
        );
        self.metrics
            .lifecycle()
            .code_changes_total
            .with_label_values(&[name])
            .inc();
        self.alert(
            Alert::new(
                AlertCategory::CodeChange,
                "code_change_detected",
                AlertSeverity::Error,
                "Strategy code changed, re-validation required",
            )
            .for_strategy(name)
            .with_detail("previous_fingerprint", validated.short())
            .with_detail("current_fingerprint", current.short())
            .with_detail("previous_status", from_status)
            .with_detail("version", &version_id)
            .with_detail("suspension_lifted", lifted),
        );
        if lifted {
            warn!("Emergency suspension of '{}' lifted by code change", name);
        }
        true
    }

    /// Move a strategy along the status table
    pub fn promote(
        &self,
        name: &str,
        to: ValidationStatus,
        approver: &str,
    ) -> Result<ValidationRecord, GateError> {
        self.promote_with_reason(name, to, approver, &format!("promoted to {}", to))
    }

    pub fn promote_with_reason(
        &self,
        name: &str,
        to: ValidationStatus,
        approver: &str,
        reason: &str,
    ) -> Result<ValidationRecord, GateError> {
        Self::require_actor(approver, name)?;
        let handle = self.record_handle(name)?;
        let now = self.clock.now();

        let (from, kind, record) = {
            let mut global = self.global.write();
            if to.is_approvable() {
                guard_approval(&global, name, to)?;
            }

            let mut record = handle.lock();
            let from = record.status();
            let kind = record.transition(to, approver, reason, now)?;

            if to == ValidationStatus::CircuitBreakerOpen {
                record.circuit_breaker.trip(now, reason);
            } else if from == ValidationStatus::CircuitBreakerOpen {
                record.circuit_breaker.reset();
            }
            if from == ValidationStatus::Quarantined && to.is_approvable() {
                // The window still holds the outcomes that caused the quarantine
                record.live_outcomes.clear();
            }
            if to == ValidationStatus::EmergencySuspended {
                global.emergency.suspend(name, approver, reason, now);
            } else if from == ValidationStatus::EmergencySuspended {
                global.emergency.clear_suspension(name, approver, "manual re-validation", now);
            }

            global.sync_approval(&record);
            (from, kind, record.clone())
        };

        info!(
            "'{}' {} -> {} by {} ({:?}): {}",
            name, from, to, approver, kind, reason
        );
        self.metrics
            .lifecycle()
            .transitions_total
            .with_label_values(&[to.as_str()])
            .inc();
        if kind == TransitionKind::Revalidation {
            debug!("'{}' restarted at {}", name, record.current_version.version_id);
        }

        match to {
            ValidationStatus::EmergencySuspended => self.alert(
                Alert::new(
                    AlertCategory::Emergency,
                    "strategy_suspended",
                    AlertSeverity::Critical,
                    format!("Strategy suspended by {}", approver),
                )
                .for_strategy(name)
                .with_detail("reason", reason),
            ),
            ValidationStatus::CircuitBreakerOpen => {
                self.metrics
                    .lifecycle()
                    .breaker_trips_total
                    .with_label_values(&[name])
                    .inc();
                self.alert(
                    Alert::new(
                        AlertCategory::CircuitBreaker,
                        "circuit_breaker_tripped",
                        AlertSeverity::Critical,
                        format!("Circuit breaker opened by {}", approver),
                    )
                    .for_strategy(name)
                    .with_detail("reason", reason),
                )
            }
            ValidationStatus::Quarantined => self.alert(
                Alert::new(
                    AlertCategory::Degradation,
                    "strategy_quarantined",
                    AlertSeverity::Error,
                    format!("Strategy quarantined by {}", approver),
                )
                .for_strategy(name)
                .with_detail("reason", reason),
            ),
            _ => {}
        }

        self.persist()?;
        Ok(record)
    }

    /// UNVALIDATED -> VALIDATION_PENDING
    pub fn begin_validation(&self, name: &str, by: &str) -> Result<ValidationRecord, GateError> {
        self.promote_with_reason(name, ValidationStatus::ValidationPending, by, "backtest started")
    }

    /// Store a backtest and move the pending strategy to VALIDATED or VALIDATION_FAILED
    pub fn apply_backtest(
        &self,
        result: &BacktestResult,
        by: &str,
    ) -> Result<ValidationStatus, GateError> {
        let name = result.strategy_name.as_str();
        Self::require_actor(by, name)?;
        let handle = self.record_handle(name)?;
        let now = self.clock.now();

        let shortfalls = self.config.validation.shortfalls(result);
        let (to, reason) = if shortfalls.is_empty() {
            (
                ValidationStatus::Validated,
                format!(
                    "backtest passed: {} bets, win rate {:.1}%",
                    result.total_bets,
                    result.win_rate * 100.0
                ),
            )
        } else {
            (
                ValidationStatus::ValidationFailed,
                format!("backtest failed: {}", shortfalls.join("; ")),
            )
        };

        {
            let mut global = self.global.write();
            if to.is_approvable() {
                guard_approval(&global, name, to)?;
            }

            let mut record = handle.lock();
            let from = record.status();
            if from != ValidationStatus::ValidationPending {
                return Err(ValidationError::InvalidTransition {
                    strategy: name.to_string(),
                    from,
                    to,
                }
                .into());
            }
            record.transition(to, by, &reason, now)?;
            record.set_baseline(result.to_metrics(), result.total_bets);
            global.sync_approval(&record);
        }

        info!("'{}' {}", name, reason);
        self.metrics
            .lifecycle()
            .transitions_total
            .with_label_values(&[to.as_str()])
            .inc();
        self.persist()?;
        Ok(to)
    }

    pub fn set_constraints(
        &self,
        name: &str,
        constraints: OperationalConstraints,
        by: &str,
    ) -> Result<(), GateError> {
        Self::require_actor(by, name)?;
        let handle = self.record_handle(name)?;
        {
            let mut record = handle.lock();
            info!(
                "'{}' constraints updated by {}: {:?} -> {:?}",
                name, by, record.constraints, constraints
            );
            record.constraints = constraints;
        }
        self.persist()
    }

    /// Ingest one settled outcome
    ///
    /// While the breaker is open the outcome also drives probation; a run of
    /// wins in HALF_OPEN closes the breaker and restores VALIDATED.
    pub fn record_outcome(&self, outcome: &LiveOutcome) -> Result<BreakerEvent, GateError> {
        let name = outcome.strategy_name.as_str();
        let handle = self.record_handle(name)?;

        {
            let mut record = handle.lock();
            if !record.circuit_breaker.is_open() {
                record.push_outcome(outcome.sample);
                return Ok(BreakerEvent::Unchanged);
            }
        }

        let now = self.clock.now();
        let event = {
            let mut global = self.global.write();
            let mut record = handle.lock();
            record.push_outcome(outcome.sample);
            if !record.circuit_breaker.is_open() {
                return Ok(BreakerEvent::Unchanged);
            }
            let event = record.circuit_breaker.record_outcome(now, outcome.sample.outcome);
            if event == BreakerEvent::Recovered {
                complete_recovery(&mut global, &mut record, now)?;
            }
            event
        };

        self.after_breaker_event(name, event)?;
        Ok(event)
    }

    /// Advance an open breaker's timers without an outcome
    pub fn poll_breaker(&self, name: &str) -> Result<BreakerEvent, GateError> {
        let handle = self.record_handle(name)?;
        let now = self.clock.now();

        let event = {
            let _global = self.global.write();
            let mut record = handle.lock();
            record.circuit_breaker.poll(now)
        };

        self.after_breaker_event(name, event)?;
        Ok(event)
    }

    fn after_breaker_event(&self, name: &str, event: BreakerEvent) -> Result<(), GateError> {
        match event {
            BreakerEvent::Unchanged => return Ok(()),
            BreakerEvent::Recovered => {
                info!("✅ '{}' recovered, circuit breaker closed", name);
                self.metrics
                    .lifecycle()
                    .breaker_recoveries_total
                    .with_label_values(&[name])
                    .inc();
                self.alert(
                    Alert::new(
                        AlertCategory::CircuitBreaker,
                        "circuit_breaker_recovered",
                        AlertSeverity::Warning,
                        "Probation passed, strategy restored to VALIDATED",
                    )
                    .for_strategy(name),
                );
            }
            BreakerEvent::ProbationFailed => warn!("'{}' failed probation, breaker reopened", name),
            other => debug!("'{}' breaker event {:?}", name, other),
        }
        self.persist()
    }

    /// Open the breaker and move the strategy to CIRCUIT_BREAKER_OPEN
    ///
    /// Returns false if the breaker was already open.
    pub fn trip_breaker(&self, name: &str, trigger: &BreakerTrigger) -> Result<bool, GateError> {
        let handle = self.record_handle(name)?;
        let now = self.clock.now();
        let reason = trigger.to_string();

        {
            let mut global = self.global.write();
            let mut record = handle.lock();
            if record.circuit_breaker.is_open() {
                return Ok(false);
            }
            if record.status() != ValidationStatus::CircuitBreakerOpen {
                record.transition(ValidationStatus::CircuitBreakerOpen, BREAKER_ACTOR, &reason, now)?;
            }
            record.circuit_breaker.trip(now, reason.as_str());
            global.approved.remove(name);
        }

        error!("🚨 Circuit breaker tripped for '{}': {}", name, reason);
        self.metrics
            .lifecycle()
            .breaker_trips_total
            .with_label_values(&[name])
            .inc();
        self.alert(
            Alert::new(
                AlertCategory::CircuitBreaker,
                "circuit_breaker_tripped",
                AlertSeverity::Critical,
                "Circuit breaker tripped, strategy blocked",
            )
            .for_strategy(name)
            .with_detail("trigger", &reason),
        );
        self.persist()?;
        Ok(true)
    }

    /// CRITICAL degradation: quarantine pending operator review
    pub fn quarantine(
        &self,
        name: &str,
        assessment: &PerformanceAssessment,
    ) -> Result<(), GateError> {
        let handle = self.record_handle(name)?;
        let now = self.clock.now();
        let reason = format!(
            "critical degradation: win rate {:.1}% over {} samples",
            assessment.live.win_rate * 100.0,
            assessment.live.samples
        );

        {
            let mut global = self.global.write();
            let mut record = handle.lock();
            record.transition(ValidationStatus::Quarantined, MONITOR_ACTOR, &reason, now)?;
            record.log_assessment(assessment, now);
            global.approved.remove(name);
        }

        error!("🚨 '{}' quarantined: {}", name, reason);
        self.metrics
            .lifecycle()
            .transitions_total
            .with_label_values(&[ValidationStatus::Quarantined.as_str()])
            .inc();
        self.alert(
            Alert::new(
                AlertCategory::Degradation,
                "strategy_quarantined",
                AlertSeverity::Critical,
                "Critical degradation, strategy quarantined",
            )
            .for_strategy(name)
            .with_detail("reason", &reason),
        );
        self.persist()?;
        Ok(())
    }

    /// Analyze the live window and route the result
    ///
    /// Breaker triggers win over the degradation level; CRITICAL quarantines;
    /// any other level is logged only when it differs from the last one.
    pub fn assess(&self, name: &str) -> Result<AssessmentAction, GateError> {
        let handle = self.record_handle(name)?;
        let now = self.clock.now();

        let (outcome, previous) = {
            let mut record = handle.lock();
            record.last_checked = Some(now);
            let outcome = self.analyzer.analyze(
                &record.live_outcomes,
                record.current_version.performance_metrics.as_ref(),
            );
            (outcome, record.last_alert_level())
        };

        let assessment = match outcome {
            AnalysisOutcome::InsufficientData { samples, required } => {
                return Ok(AssessmentAction::InsufficientData { samples, required })
            }
            AnalysisOutcome::Assessed(assessment) => assessment,
        };

        if let Some(trigger) = assessment.trigger {
            self.trip_breaker(name, &trigger)?;
            return Ok(AssessmentAction::BreakerTripped(trigger));
        }

        if assessment.level == DegradationLevel::Critical {
            self.quarantine(name, &assessment)?;
            return Ok(AssessmentAction::Quarantined);
        }

        if assessment.level == previous {
            return Ok(AssessmentAction::Steady(previous));
        }

        let logged = handle.lock().log_assessment(&assessment, now);
        if !logged {
            return Ok(AssessmentAction::Steady(assessment.level));
        }

        self.metrics
            .monitor()
            .degradations_total
            .with_label_values(&[assessment.level.as_str()])
            .inc();

        let severity = match assessment.level {
            DegradationLevel::None => AlertSeverity::Info,
            DegradationLevel::Minor => AlertSeverity::Warning,
            _ => AlertSeverity::Error,
        };
        warn!(
            "'{}' performance {} -> {} (win rate {:.1}%, mean roi {:.3})",
            name,
            previous,
            assessment.level,
            assessment.live.win_rate * 100.0,
            assessment.live.mean_roi
        );
        let mut alert = Alert::new(
            AlertCategory::Degradation,
            "performance_degradation",
            severity,
            format!("Performance level {} -> {}", previous, assessment.level),
        )
        .for_strategy(name)
        .with_detail("win_rate", format!("{:.4}", assessment.live.win_rate))
        .with_detail("samples", assessment.live.samples);
        if let Some(decline) = assessment.win_rate_decline {
            alert = alert.with_detail("win_rate_decline", format!("{:.4}", decline));
        }
        if let Some(decline) = assessment.roi_decline {
            alert = alert.with_detail("roi_decline", format!("{:.4}", decline));
        }
        self.alert(alert);

        Ok(AssessmentAction::LevelChanged {
            from: previous,
            to: assessment.level,
        })
    }
}

/// Approvable targets are refused during an emergency or failover
fn guard_approval(
    global: &GlobalState,
    name: &str,
    to: ValidationStatus,
) -> Result<(), ValidationError> {
    if global.emergency.kill_switch_active {
        return Err(ValidationError::EmergencyActive {
            strategy: name.to_string(),
            to,
        });
    }
    if !global.healthy() {
        return Err(ValidationError::RegistryUnhealthy {
            strategy: name.to_string(),
            to,
        });
    }
    Ok(())
}

fn complete_recovery(
    global: &mut GlobalState,
    record: &mut ValidationRecord,
    now: DateTime<Utc>,
) -> Result<(), ValidationError> {
    if record.status() == ValidationStatus::CircuitBreakerOpen {
        record.transition(
            ValidationStatus::Validated,
            BREAKER_ACTOR,
            "probation passed",
            now,
        )?;
    }
    // The window still holds the losses that tripped the breaker
    record.live_outcomes.clear();
    global.sync_approval(record);
    Ok(())
}
