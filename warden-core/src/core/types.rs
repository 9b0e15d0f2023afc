//! Domain types shared by every component of the gate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Validation status of a strategy's current version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    /// Never validated, or code changed since last validation
    Unvalidated,
    /// Backtest validation in progress
    ValidationPending,
    /// Passed validation
    Validated,
    /// Failed validation (terminal until manual re-validation)
    ValidationFailed,
    /// Validated and manually elevated by an operator
    Approved,
    /// Suspended after critical performance degradation
    Quarantined,
    /// Suspended by the circuit breaker
    CircuitBreakerOpen,
    /// Suspended by an emergency control (terminal until manual re-validation)
    EmergencySuspended,
    /// Retired by an operator (terminal until manual re-validation)
    Deprecated,
}

impl ValidationStatus {
    pub const ALL: [ValidationStatus; 9] = [
        Self::Unvalidated,
        Self::ValidationPending,
        Self::Validated,
        Self::ValidationFailed,
        Self::Approved,
        Self::Quarantined,
        Self::CircuitBreakerOpen,
        Self::EmergencySuspended,
        Self::Deprecated,
    ];

    /// Statuses that allow a strategy into the approved set
    #[inline]
    pub fn is_approvable(&self) -> bool {
        matches!(self, Self::Validated | Self::Approved)
    }

    /// Statuses left only through explicit manual re-validation
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed | Self::Deprecated | Self::EmergencySuspended
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unvalidated => "UNVALIDATED",
            Self::ValidationPending => "VALIDATION_PENDING",
            Self::Validated => "VALIDATED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::Approved => "APPROVED",
            Self::Quarantined => "QUARANTINED",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::EmergencySuspended => "EMERGENCY_SUSPENDED",
            Self::Deprecated => "DEPRECATED",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValidationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown validation status '{}'", s))
    }
}

/// One settled live outcome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSample {
    /// True when the recommendation won
    pub outcome: bool,
    /// Return on the stake (0.9 = +90%, -1.0 = full loss)
    pub roi: f64,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeSample {
    pub fn new(outcome: bool, roi: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            outcome,
            roi,
            timestamp,
        }
    }
}

/// Outcome as delivered by the live feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveOutcome {
    pub strategy_name: String,
    #[serde(flatten)]
    pub sample: OutcomeSample,
}

/// Bounded FIFO of live outcomes; the oldest sample is evicted first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredWindow")]
pub struct OutcomeWindow {
    capacity: usize,
    samples: VecDeque<OutcomeSample>,
}

/// Window as read from disk, before its bounds are checked
#[derive(Deserialize)]
struct StoredWindow {
    capacity: usize,
    samples: VecDeque<OutcomeSample>,
}

impl TryFrom<StoredWindow> for OutcomeWindow {
    type Error = String;

    fn try_from(stored: StoredWindow) -> Result<Self, Self::Error> {
        if stored.capacity == 0 {
            return Err("outcome window capacity must be at least 1".to_string());
        }
        if stored.samples.len() > stored.capacity {
            return Err(format!(
                "outcome window holds {} samples but its capacity is {}",
                stored.samples.len(),
                stored.capacity
            ));
        }
        Ok(Self {
            capacity: stored.capacity,
            samples: stored.samples,
        })
    }
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: OutcomeSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Change the capacity, dropping the oldest samples that no longer fit
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &OutcomeSample> + ExactSizeIterator {
        self.samples.iter()
    }
}

/// Baseline metrics a version was validated with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Fraction of winning bets (0.0 to 1.0)
    pub win_rate: f64,
    /// Mean return per bet as a fraction of stake
    pub roi: f64,
    pub sample_size: u64,
    pub confidence_score: f64,
}

/// Output of the external backtest engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub total_bets: u64,
    pub wins: u64,
    pub win_rate: f64,
    /// Profit per 100 units staked
    pub roi_per_100: f64,
    pub confidence_score: f64,
}

impl BacktestResult {
    pub fn to_metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics {
            win_rate: self.win_rate,
            roi: self.roi_per_100 / 100.0,
            sample_size: self.total_bets,
            confidence_score: self.confidence_score,
        }
    }
}

/// Limits echoed back with every allowed decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationalConstraints {
    #[serde(default = "default_max_daily_recommendations")]
    pub max_daily_recommendations: u32,
    #[serde(default = "default_max_bet_size_multiplier")]
    pub max_bet_size_multiplier: f64,
    #[serde(default)]
    pub requires_manual_approval: bool,
}

fn default_max_daily_recommendations() -> u32 {
    10
}

fn default_max_bet_size_multiplier() -> f64 {
    1.0
}

impl Default for OperationalConstraints {
    fn default() -> Self {
        Self {
            max_daily_recommendations: default_max_daily_recommendations(),
            max_bet_size_multiplier: default_max_bet_size_multiplier(),
            requires_manual_approval: false,
        }
    }
}
