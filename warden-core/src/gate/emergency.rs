//! Emergency controls on the gate
//!
//! The kill switch blocks every strategy until an operator clears it.
//! Clearing it does not re-approve anything: strategies it suspended stay
//! EMERGENCY_SUSPENDED until they are re-validated.

use super::ValidationGate;
use crate::core::{GateError, ValidationStatus};
use crate::monitoring::{Alert, AlertCategory, AlertSeverity};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of activating the kill switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillSwitchOutcome {
    /// False if the switch was already active
    pub newly_activated: bool,
    /// Strategies moved to EMERGENCY_SUSPENDED
    pub suspended: Vec<String>,
}

impl ValidationGate {
    /// Block every strategy immediately
    pub fn activate_kill_switch(
        &self,
        by: &str,
        reason: &str,
    ) -> Result<KillSwitchOutcome, GateError> {
        Self::require_actor(by, "kill switch")?;
        let now = self.clock.now();

        let outcome = {
            let mut global = self.global.write();
            let newly_activated = global.emergency.activate_kill_switch(by, reason, now);

            let mut suspended = Vec::new();
            let approved: Vec<String> = global.approved.iter().cloned().collect();
            for name in approved {
                let Some(handle) = self.records.get(&name).map(|r| Arc::clone(r.value())) else {
                    continue;
                };
                let mut record = handle.lock();
                if !record.status().is_approvable() {
                    continue;
                }
                match record.transition(ValidationStatus::EmergencySuspended, by, reason, now) {
                    Ok(_) => suspended.push(name),
                    Err(e) => warn!("Kill switch could not suspend '{}': {}", name, e),
                }
            }
            global.approved.clear();

            KillSwitchOutcome {
                newly_activated,
                suspended,
            }
        };

        if outcome.newly_activated {
            error!(
                "🚨 KILL SWITCH ACTIVATED by {}: {} ({} strategies suspended)",
                by,
                reason,
                outcome.suspended.len()
            );
            self.alert(
                Alert::new(
                    AlertCategory::Emergency,
                    "kill_switch",
                    AlertSeverity::Critical,
                    "Kill switch activated, all strategies blocked",
                )
                .with_detail("by", by)
                .with_detail("reason", reason)
                .with_detail("suspended", outcome.suspended.join(",")),
            );
        } else {
            info!("Kill switch already active, activation by {} ignored", by);
        }
        self.metrics
            .lifecycle()
            .transitions_total
            .with_label_values(&[ValidationStatus::EmergencySuspended.as_str()])
            .inc_by(outcome.suspended.len() as u64);

        self.persist()?;
        Ok(outcome)
    }

    /// Clear the kill switch; returns false if it was not active
    pub fn deactivate_kill_switch(&self, by: &str) -> Result<bool, GateError> {
        Self::require_actor(by, "kill switch")?;
        let now = self.clock.now();

        let cleared = self.global.write().emergency.deactivate_kill_switch(by, now);
        if !cleared {
            return Ok(false);
        }

        warn!("Kill switch deactivated by {}", by);
        self.alert(
            Alert::new(
                AlertCategory::Emergency,
                "kill_switch_cleared",
                AlertSeverity::Critical,
                "Kill switch deactivated, suspended strategies need re-validation",
            )
            .with_detail("by", by),
        );
        self.persist()?;
        Ok(true)
    }

    /// Suspend one strategy regardless of its status
    ///
    /// Returns false if it was already suspended.
    pub fn emergency_suspend(&self, name: &str, by: &str, reason: &str) -> Result<bool, GateError> {
        Self::require_actor(by, name)?;
        let handle = self.record_handle(name)?;
        let now = self.clock.now();

        let changed = {
            let mut global = self.global.write();
            let mut record = handle.lock();
            let mut changed = global.emergency.suspend(name, by, reason, now);
            if record.status() != ValidationStatus::EmergencySuspended {
                record.force_status(ValidationStatus::EmergencySuspended, by, reason, now);
                changed = true;
            }
            global.approved.remove(name);
            changed
        };

        if !changed {
            return Ok(false);
        }

        error!("🚨 '{}' emergency suspended by {}: {}", name, by, reason);
        self.metrics
            .lifecycle()
            .transitions_total
            .with_label_values(&[ValidationStatus::EmergencySuspended.as_str()])
            .inc();
        self.alert(
            Alert::new(
                AlertCategory::Emergency,
                "strategy_suspended",
                AlertSeverity::Critical,
                format!("Emergency suspension by {}", by),
            )
            .for_strategy(name)
            .with_detail("reason", reason),
        );
        self.persist()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GateConfig;
    use crate::core::{ManualClock, ValidationStatus};
    use crate::gate::{DenialCategory, Remedy, ValidationGate};
    use crate::testing::StaticDefinition;
    use std::sync::Arc;

    fn gate(dir: &std::path::Path) -> ValidationGate {
        let mut config = GateConfig::rooted_at(dir);
        config.alerts.outputs.clear();
        ValidationGate::builder(config)
            .clock(Arc::new(ManualClock::default()))
            .open()
            .unwrap()
    }

    fn approve(gate: &ValidationGate, name: &str) {
        gate.register_strategy(Arc::new(StaticDefinition::new(name, "v1")))
            .unwrap();
        gate.promote(name, ValidationStatus::ValidationPending, "ci").unwrap();
        gate.promote(name, ValidationStatus::Validated, "ci").unwrap();
    }

    #[test]
    fn test_kill_switch_blocks_everything() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(dir.path());
        approve(&gate, "a");
        approve(&gate, "b");
        gate.register_strategy(Arc::new(StaticDefinition::new("c", "v1")))
            .unwrap();

        let outcome = gate.activate_kill_switch("opA", "drill").unwrap();
        assert!(outcome.newly_activated);
        assert_eq!(outcome.suspended, vec!["a".to_string(), "b".to_string()]);

        for name in ["a", "b", "c", "unknown"] {
            let decision = gate.check(name);
            assert!(!decision.allowed);
            assert_eq!(decision.category, Some(DenialCategory::Emergency));
        }
        assert!(gate.approved_strategies().is_empty());
        assert!(gate.snapshot().approved.is_empty());

        // Second activation is a no-op
        assert!(!gate.activate_kill_switch("opB", "again").unwrap().newly_activated);
    }

    #[test]
    fn test_deactivation_does_not_reapprove() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(dir.path());
        approve(&gate, "a");
        gate.activate_kill_switch("opA", "drill").unwrap();

        assert!(gate.deactivate_kill_switch("opA").unwrap());
        assert!(!gate.deactivate_kill_switch("opA").unwrap());

        let decision = gate.check("a");
        assert_eq!(decision.category, Some(DenialCategory::Emergency));
        assert_eq!(decision.remedy, Some(Remedy::NeedsManualOverride));

        // Re-validation is the way back
        gate.promote("a", ValidationStatus::Unvalidated, "opA").unwrap();
        gate.promote("a", ValidationStatus::ValidationPending, "ci").unwrap();
        gate.promote("a", ValidationStatus::Validated, "ci").unwrap();
        assert!(gate.check("a").allowed);
    }

    #[test]
    fn test_emergency_suspend_from_any_status() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(dir.path());
        approve(&gate, "a");
        gate.register_strategy(Arc::new(StaticDefinition::new("p", "v1")))
            .unwrap();
        gate.promote("p", ValidationStatus::ValidationPending, "ci").unwrap();

        assert!(gate.emergency_suspend("a", "opA", "bad data").unwrap());
        assert!(gate.emergency_suspend("p", "opA", "bad data").unwrap());
        assert!(!gate.emergency_suspend("a", "opA", "again").unwrap());

        let snapshot = gate.snapshot();
        assert!(!snapshot.approved.contains("a"));
        assert_eq!(
            snapshot.records["p"].status(),
            ValidationStatus::EmergencySuspended
        );
        assert!(gate.check("a").requires_manual_override);
        assert!(gate.emergency_suspend("a", "", "anon").is_err());
    }
}
