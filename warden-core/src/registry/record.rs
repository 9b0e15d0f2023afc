//! Validation records
//!
//! One record per strategy name. The record owns the current version, the
//! archived versions, the append-only history, the breaker state, the live
//! outcome window and the operational constraints. Every mutation goes
//! through methods here so the status table is always consulted.

use super::version::StrategyVersion;
use crate::analysis::{DegradationLevel, LiveMetrics, PerformanceAssessment};
use crate::core::{
    transition_kind, OperationalConstraints, OutcomeSample, OutcomeWindow, PerformanceMetrics,
    TransitionKind, ValidationError, ValidationStatus,
};
use crate::fingerprint::Fingerprint;
use crate::resilience::{BreakerConfig, CircuitBreakerState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Settings applied to newly created records
#[derive(Debug, Clone, PartialEq)]
pub struct RecordTemplate {
    pub window_size: usize,
    pub breaker: BreakerConfig,
    pub constraints: OperationalConstraints,
}

impl Default for RecordTemplate {
    fn default() -> Self {
        Self {
            window_size: 50,
            breaker: BreakerConfig::default(),
            constraints: OperationalConstraints::default(),
        }
    }
}

/// One audited status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    /// `None` for the entry that created the record
    pub from: Option<ValidationStatus>,
    pub to: ValidationStatus,
    pub actor: String,
    pub reason: String,
    pub version_id: String,
}

/// Logged whenever the degradation level of the current version changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub timestamp: DateTime<Utc>,
    pub level: DegradationLevel,
    pub version_id: String,
    pub metrics: LiveMetrics,
    pub win_rate_decline: Option<f64>,
    pub roi_decline: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub strategy_name: String,
    pub current_version: StrategyVersion,
    #[serde(default)]
    pub archived_versions: Vec<StrategyVersion>,
    #[serde(default)]
    pub validation_history: Vec<HistoryEntry>,
    pub circuit_breaker: CircuitBreakerState,
    pub live_outcomes: OutcomeWindow,
    #[serde(default)]
    pub constraints: OperationalConstraints,
    #[serde(default)]
    pub performance_alerts: Vec<PerformanceAlert>,
    pub last_checked: Option<DateTime<Utc>>,
    pub status_changed_at: DateTime<Utc>,
}

impl ValidationRecord {
    pub fn new(
        strategy_name: &str,
        fingerprint: Fingerprint,
        template: &RecordTemplate,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let current_version = StrategyVersion::new(strategy_name, 1, fingerprint, now);
        let created = HistoryEntry {
            at: now,
            from: None,
            to: ValidationStatus::Unvalidated,
            actor: actor.to_string(),
            reason: "registered".to_string(),
            version_id: current_version.version_id.clone(),
        };
        Self {
            strategy_name: strategy_name.to_string(),
            current_version,
            archived_versions: Vec::new(),
            validation_history: vec![created],
            circuit_breaker: CircuitBreakerState::new(&template.breaker),
            live_outcomes: OutcomeWindow::new(template.window_size),
            constraints: template.constraints.clone(),
            performance_alerts: Vec::new(),
            last_checked: None,
            status_changed_at: now,
        }
    }

    #[inline]
    pub fn status(&self) -> ValidationStatus {
        self.current_version.validation_status
    }

    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.current_version.code_fingerprint
    }

    /// Whether the record on its own qualifies for the approved set
    pub fn is_approvable(&self) -> bool {
        self.status().is_approvable() && !self.circuit_breaker.is_open()
    }

    /// Apply a table transition
    ///
    /// A re-validation back to UNVALIDATED archives the current version and
    /// starts a fresh one with the same fingerprint, so the archived version
    /// keeps the status it ended with.
    pub fn transition(
        &mut self,
        to: ValidationStatus,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionKind, ValidationError> {
        let from = self.status();
        let kind = transition_kind(from, to).ok_or_else(|| ValidationError::InvalidTransition {
            strategy: self.strategy_name.clone(),
            from,
            to,
        })?;

        if kind == TransitionKind::Revalidation {
            let fingerprint = self.fingerprint();
            self.start_new_version(fingerprint, now);
        } else {
            self.current_version.validation_status = to;
        }

        self.push_history(Some(from), to, actor, reason, now);
        Ok(kind)
    }

    /// Set the status without consulting the table
    ///
    /// Only emergency suspension uses this: it applies from any status.
    pub fn force_status(
        &mut self,
        to: ValidationStatus,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        let from = self.status();
        self.current_version.validation_status = to;
        self.push_history(Some(from), to, actor, reason, now);
    }

    /// Replace the current version after a fingerprint change
    ///
    /// Bypasses the status table: any status goes back to UNVALIDATED. The
    /// outcome window and breaker describe the old code and are reset.
    pub fn replace_fingerprint(
        &mut self,
        fingerprint: Fingerprint,
        actor: &str,
        now: DateTime<Utc>,
    ) -> &StrategyVersion {
        let from = self.status();
        let previous = self.current_version.version_id.clone();
        self.start_new_version(fingerprint, now);
        self.live_outcomes.clear();
        self.circuit_breaker.reset();
        self.push_history(
            Some(from),
            ValidationStatus::Unvalidated,
            actor,
            &format!("code change detected, superseded {}", previous),
            now,
        );
        &self.current_version
    }

    fn start_new_version(&mut self, fingerprint: Fingerprint, now: DateTime<Utc>) {
        let next = self.current_version.successor(fingerprint, now);
        let archived = std::mem::replace(&mut self.current_version, next);
        self.archived_versions.push(archived);
    }

    fn push_history(
        &mut self,
        from: Option<ValidationStatus>,
        to: ValidationStatus,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        self.validation_history.push(HistoryEntry {
            at: now,
            from,
            to,
            actor: actor.to_string(),
            reason: reason.to_string(),
            version_id: self.current_version.version_id.clone(),
        });
        self.status_changed_at = now;
    }

    /// Store the backtest baseline on the current version
    pub fn set_baseline(&mut self, metrics: PerformanceMetrics, samples: u64) {
        self.current_version.performance_metrics = Some(metrics);
        self.current_version.backtest_samples = samples;
    }

    pub fn push_outcome(&mut self, sample: OutcomeSample) {
        self.live_outcomes.push(sample);
    }

    /// Last degradation level logged for the current version
    pub fn last_alert_level(&self) -> DegradationLevel {
        self.performance_alerts
            .iter()
            .rev()
            .find(|a| a.version_id == self.current_version.version_id)
            .map(|a| a.level)
            .unwrap_or(DegradationLevel::None)
    }

    /// Append a performance alert if the level changed; returns whether it did
    pub fn log_assessment(&mut self, assessment: &PerformanceAssessment, now: DateTime<Utc>) -> bool {
        if assessment.level == self.last_alert_level() {
            return false;
        }
        self.performance_alerts.push(PerformanceAlert {
            timestamp: now,
            level: assessment.level,
            version_id: self.current_version.version_id.clone(),
            metrics: assessment.live.clone(),
            win_rate_decline: assessment.win_rate_decline,
            roi_decline: assessment.roi_decline,
        });
        true
    }
}
