//! Gate decisions
//!
//! A denial is an expected outcome, not an error. Every denial carries a
//! human-readable reason, a machine-readable category and the remedy an
//! operator or caller should expect.

use crate::core::OperationalConstraints;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a decision was denied, in check order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialCategory {
    Emergency,
    RegistryUnhealthy,
    UnknownStrategy,
    FingerprintUnavailable,
    CodeChangeDetected,
    CircuitBreakerOpen,
    NotApproved,
    QuotaExhausted,
}

impl DenialCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::RegistryUnhealthy => "registry_unhealthy",
            Self::UnknownStrategy => "unknown_strategy",
            Self::FingerprintUnavailable => "fingerprint_unavailable",
            Self::CodeChangeDetected => "code_change_detected",
            Self::CircuitBreakerOpen => "circuit_breaker_open",
            Self::NotApproved => "not_approved",
            Self::QuotaExhausted => "quota_exhausted",
        }
    }

    /// Remedy implied by the category alone
    pub fn default_remedy(&self) -> Remedy {
        match self {
            Self::Emergency | Self::RegistryUnhealthy | Self::FingerprintUnavailable => {
                Remedy::NeedsManualOverride
            }
            Self::UnknownStrategy | Self::CodeChangeDetected | Self::NotApproved => {
                Remedy::NeedsValidation
            }
            Self::CircuitBreakerOpen => Remedy::AutomaticRetry,
            Self::QuotaExhausted => Remedy::WaitForReset,
        }
    }
}

impl fmt::Display for DenialCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What it takes for a denied strategy to be allowed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remedy {
    /// Run the validation pipeline
    NeedsValidation,
    /// An operator has to act
    NeedsManualOverride,
    /// Temporarily circuit-broken, recovers on its own
    AutomaticRetry,
    /// Daily budget used up, resets at the next UTC day
    WaitForReset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub strategy_name: String,
    pub allowed: bool,
    pub category: Option<DenialCategory>,
    pub remedy: Option<Remedy>,
    pub reason: String,
    pub requires_validation: bool,
    pub requires_manual_override: bool,
    pub code_change_detected: bool,
    /// Set for circuit-breaker denials: whether the open timeout has elapsed
    pub can_recover: Option<bool>,
    /// Echoed back on allowed decisions
    pub constraints: Option<OperationalConstraints>,
    /// Set by `authorize_recommendation`
    pub quota_remaining: Option<u32>,
    pub decided_at: DateTime<Utc>,
}

impl GateDecision {
    pub fn allow(
        strategy_name: &str,
        constraints: OperationalConstraints,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            allowed: true,
            category: None,
            remedy: None,
            reason: "validated and approved".to_string(),
            requires_validation: false,
            requires_manual_override: false,
            code_change_detected: false,
            can_recover: None,
            constraints: Some(constraints),
            quota_remaining: None,
            decided_at,
        }
    }

    pub fn deny(
        strategy_name: &str,
        category: DenialCategory,
        reason: impl Into<String>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        let remedy = category.default_remedy();
        Self {
            strategy_name: strategy_name.to_string(),
            allowed: false,
            category: Some(category),
            remedy: Some(remedy),
            reason: reason.into(),
            requires_validation: false,
            requires_manual_override: remedy == Remedy::NeedsManualOverride,
            code_change_detected: false,
            can_recover: None,
            constraints: None,
            quota_remaining: None,
            decided_at,
        }
    }

    pub fn requiring_validation(mut self, required: bool) -> Self {
        self.requires_validation = required;
        self
    }

    pub fn requiring_manual_override(mut self) -> Self {
        self.requires_manual_override = true;
        self.remedy = Some(Remedy::NeedsManualOverride);
        self
    }

    pub fn with_code_change(mut self) -> Self {
        self.code_change_detected = true;
        self
    }

    pub fn recoverable(mut self, can_recover: bool) -> Self {
        self.can_recover = Some(can_recover);
        self
    }

    pub fn with_quota_remaining(mut self, remaining: u32) -> Self {
        self.quota_remaining = Some(remaining);
        self
    }

    /// Label used for metrics
    pub fn outcome_label(&self) -> &'static str {
        if self.allowed {
            "allowed"
        } else {
            "denied"
        }
    }

    pub fn category_label(&self) -> &'static str {
        self.category.map(|c| c.as_str()).unwrap_or("none")
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            None => write!(f, "{}: allowed", self.strategy_name),
            Some(category) => write!(
                f,
                "{}: blocked ({}) - {}",
                self.strategy_name, category, self.reason
            ),
        }
    }
}
