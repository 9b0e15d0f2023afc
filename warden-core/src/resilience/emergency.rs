//! Emergency controls
//!
//! Two global switches enforced ahead of all per-strategy logic:
//!
//! - **Kill switch**: revokes every approval at once. Deactivating it only
//!   clears the flag; every strategy needs a fresh manual re-approval.
//! - **Emergency suspension**: the same effect scoped to one strategy.
//!
//! Both are idempotent and audited (who, when, why). This type only holds
//! the persisted state; the gate applies the effects on records and the
//! approved set while holding the global write lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Audited emergency action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyAction {
    KillSwitchActivated,
    KillSwitchDeactivated,
    StrategySuspended,
    SuspensionCleared,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAuditEntry {
    pub at: DateTime<Utc>,
    pub actor: String,
    pub action: EmergencyAction,
    pub strategy: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suspension {
    pub by: String,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Process-wide emergency state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyControls {
    pub kill_switch_active: bool,
    /// True while at least one strategy is individually suspended
    pub emergency_suspension_active: bool,
    pub activated_by: Option<String>,
    pub activation_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    /// Always false: emergency state never clears itself
    pub auto_recovery_enabled: bool,
    #[serde(default)]
    pub suspended: BTreeMap<String, Suspension>,
    #[serde(default)]
    pub audit_log: Vec<EmergencyAuditEntry>,
}

impl Default for EmergencyControls {
    fn default() -> Self {
        Self {
            kill_switch_active: false,
            emergency_suspension_active: false,
            activated_by: None,
            activation_time: None,
            reason: None,
            auto_recovery_enabled: false,
            suspended: BTreeMap::new(),
            audit_log: Vec::new(),
        }
    }
}

impl EmergencyControls {
    /// Returns false if the kill switch was already active
    pub fn activate_kill_switch(&mut self, by: &str, reason: &str, now: DateTime<Utc>) -> bool {
        if self.kill_switch_active {
            warn!(
                "Kill switch already active (by {:?} at {:?}), ignoring request from {}",
                self.activated_by, self.activation_time, by
            );
            return false;
        }

        error!("🚨 KILL SWITCH ACTIVATED by {}: {}", by, reason);
        self.kill_switch_active = true;
        self.activated_by = Some(by.to_string());
        self.activation_time = Some(now);
        self.reason = Some(reason.to_string());
        self.audit(now, by, EmergencyAction::KillSwitchActivated, None, reason);
        true
    }

    /// Returns false if the kill switch was not active
    pub fn deactivate_kill_switch(&mut self, by: &str, now: DateTime<Utc>) -> bool {
        if !self.kill_switch_active {
            return false;
        }

        info!(
            "Kill switch deactivated by {}; strategies require manual re-approval",
            by
        );
        self.kill_switch_active = false;
        self.activated_by = Some(by.to_string());
        self.activation_time = Some(now);
        self.reason = None;
        self.audit(
            now,
            by,
            EmergencyAction::KillSwitchDeactivated,
            None,
            "manual deactivation",
        );
        true
    }

    /// Returns false if the strategy was already suspended
    pub fn suspend(&mut self, strategy: &str, by: &str, reason: &str, now: DateTime<Utc>) -> bool {
        if self.suspended.contains_key(strategy) {
            return false;
        }

        error!("Emergency suspension of '{}' by {}: {}", strategy, by, reason);
        self.suspended.insert(
            strategy.to_string(),
            Suspension {
                by: by.to_string(),
                at: now,
                reason: reason.to_string(),
            },
        );
        self.emergency_suspension_active = true;
        self.audit(
            now,
            by,
            EmergencyAction::StrategySuspended,
            Some(strategy),
            reason,
        );
        true
    }

    /// Lift one strategy's suspension; the strategy restarts at UNVALIDATED either way
    pub fn clear_suspension(
        &mut self,
        strategy: &str,
        by: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if self.suspended.remove(strategy).is_none() {
            return false;
        }

        info!("Emergency suspension of '{}' cleared by {}: {}", strategy, by, reason);
        self.emergency_suspension_active = !self.suspended.is_empty();
        self.audit(
            now,
            by,
            EmergencyAction::SuspensionCleared,
            Some(strategy),
            reason,
        );
        true
    }

    #[inline]
    pub fn is_suspended(&self, strategy: &str) -> bool {
        self.suspended.contains_key(strategy)
    }

    /// Whether any emergency control blocks this strategy
    #[inline]
    pub fn blocks(&self, strategy: &str) -> bool {
        self.kill_switch_active || self.is_suspended(strategy)
    }

    fn audit(
        &mut self,
        at: DateTime<Utc>,
        actor: &str,
        action: EmergencyAction,
        strategy: Option<&str>,
        reason: &str,
    ) {
        self.audit_log.push(EmergencyAuditEntry {
            at,
            actor: actor.to_string(),
            action,
            strategy: strategy.map(str::to_string),
            reason: reason.to_string(),
        });
    }
}
