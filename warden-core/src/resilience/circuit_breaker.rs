//! Per-strategy circuit breaker
//!
//! Three-state breaker persisted inside each validation record:
//! Closed (normal) → Open (tripped) → HalfOpen (probation) → Closed
//!
//! ```text
//!            trip                 timeout elapsed
//!   CLOSED ────────► OPEN ──────────────────────► HALF_OPEN
//!     ▲               ▲  │ loss: timer reset          │  │
//!     │               │  └────────────┘               │  │ window lapses:
//!     │               └──────── loss ─────────────────┘  │ probation restarts
//!     └──────────── N consecutive wins ──────────────────┘
//! ```
//!
//! Unlike an in-process breaker all timing is wall-clock (`DateTime<Utc>`),
//! so an open breaker stays open across restarts. Callers hold the record
//! lock; nothing here is internally synchronized.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Breaker phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerPhase {
    /// Normal operation
    Closed,
    /// Tripped, waiting for the timeout
    Open,
    /// Timeout elapsed, counting successes during probation
    HalfOpen,
}

impl fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BreakerPhase::Closed => "CLOSED",
            BreakerPhase::Open => "OPEN",
            BreakerPhase::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Seconds an open breaker waits before probation
    pub timeout_seconds: u64,
    /// Seconds allowed to collect the required successes
    pub probation_window_seconds: u64,
    /// Consecutive wins during probation that close the breaker
    pub recovery_success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 3600,
            probation_window_seconds: 300,
            recovery_success_threshold: 3,
        }
    }
}

impl BreakerConfig {
    /// Short timings for tests
    pub fn aggressive() -> Self {
        Self {
            timeout_seconds: 60,
            probation_window_seconds: 30,
            recovery_success_threshold: 2,
        }
    }
}

/// What a breaker call changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerEvent {
    Unchanged,
    Tripped,
    /// Already open; the trip only refreshed the failure bookkeeping
    AlreadyOpen,
    ProbationStarted,
    /// Probation window lapsed before enough successes
    ProbationRestarted,
    /// Loss while open pushed the timeout back
    TimerReset,
    /// Loss during probation reopened the breaker
    ProbationFailed,
    Recovered,
}

/// Persisted breaker state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub phase: BreakerPhase,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Start of the current open period; reset by every failure while not closed
    pub opened_at: Option<DateTime<Utc>>,
    pub probation_started_at: Option<DateTime<Utc>>,
    pub probation_successes: u32,
    pub timeout_seconds: u64,
    pub probation_window_seconds: u64,
    pub recovery_success_threshold: u32,
    pub last_trip_reason: Option<String>,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::new(&BreakerConfig::default())
    }
}

impl CircuitBreakerState {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            phase: BreakerPhase::Closed,
            consecutive_failures: 0,
            total_failures: 0,
            last_failure_time: None,
            opened_at: None,
            probation_started_at: None,
            probation_successes: 0,
            timeout_seconds: config.timeout_seconds,
            probation_window_seconds: config.probation_window_seconds,
            recovery_success_threshold: config.recovery_success_threshold.max(1),
            last_trip_reason: None,
        }
    }

    /// True unless closed; probation still blocks the strategy
    #[inline]
    pub fn is_open(&self) -> bool {
        self.phase != BreakerPhase::Closed
    }

    fn timeout(&self) -> Duration {
        Duration::seconds(self.timeout_seconds as i64)
    }

    fn probation_window(&self) -> Duration {
        Duration::seconds(self.probation_window_seconds as i64)
    }

    /// Whether the open period has lasted at least `timeout_seconds`
    pub fn timeout_elapsed(&self, now: DateTime<Utc>) -> bool {
        match (self.phase, self.opened_at) {
            (BreakerPhase::Closed, _) => false,
            (_, Some(opened_at)) => now - opened_at >= self.timeout(),
            (_, None) => true,
        }
    }

    /// Time left before probation can start
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let opened_at = self.opened_at?;
        if self.phase != BreakerPhase::Open {
            return None;
        }
        let left = opened_at + self.timeout() - now;
        Some(left.max(Duration::zero()))
    }

    /// Open the breaker
    pub fn trip(&mut self, now: DateTime<Utc>, reason: impl Into<String>) -> BreakerEvent {
        let reason = reason.into();
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_failure_time = Some(now);
        self.last_trip_reason = Some(reason.clone());

        if self.is_open() {
            debug!("Breaker already {}, refreshing trip: {}", self.phase, reason);
            self.transition_to_open(now);
            return BreakerEvent::AlreadyOpen;
        }

        warn!("Circuit breaker TRIPPED - transitioning to OPEN: {}", reason);
        self.transition_to_open(now);
        BreakerEvent::Tripped
    }

    /// Advance time-driven transitions
    pub fn poll(&mut self, now: DateTime<Utc>) -> BreakerEvent {
        match self.phase {
            BreakerPhase::Closed => BreakerEvent::Unchanged,
            BreakerPhase::Open => {
                if self.timeout_elapsed(now) {
                    self.transition_to_half_open(now);
                    BreakerEvent::ProbationStarted
                } else {
                    BreakerEvent::Unchanged
                }
            }
            BreakerPhase::HalfOpen => {
                let lapsed = self
                    .probation_started_at
                    .map(|start| now - start > self.probation_window())
                    .unwrap_or(true);
                if lapsed {
                    debug!(
                        "Probation window lapsed with {}/{} successes, restarting",
                        self.probation_successes, self.recovery_success_threshold
                    );
                    self.transition_to_half_open(now);
                    BreakerEvent::ProbationRestarted
                } else {
                    BreakerEvent::Unchanged
                }
            }
        }
    }

    /// Feed one settled outcome observed while the breaker is not closed
    pub fn record_outcome(&mut self, now: DateTime<Utc>, won: bool) -> BreakerEvent {
        if self.phase == BreakerPhase::Closed {
            return BreakerEvent::Unchanged;
        }

        let polled = self.poll(now);

        match (self.phase, won) {
            (BreakerPhase::Open, false) => {
                self.record_failure(now);
                self.transition_to_open(now);
                BreakerEvent::TimerReset
            }
            (BreakerPhase::Open, true) => polled,
            (BreakerPhase::HalfOpen, true) => {
                self.probation_successes += 1;
                if self.probation_successes >= self.recovery_success_threshold {
                    self.transition_to_closed();
                    BreakerEvent::Recovered
                } else {
                    BreakerEvent::Unchanged
                }
            }
            (BreakerPhase::HalfOpen, false) => {
                self.record_failure(now);
                warn!("Failure during probation, breaker reopened");
                self.transition_to_open(now);
                BreakerEvent::ProbationFailed
            }
            (BreakerPhase::Closed, _) => BreakerEvent::Unchanged,
        }
    }

    /// Close unconditionally, keeping lifetime totals
    pub fn reset(&mut self) {
        if self.is_open() {
            info!("Circuit breaker manually reset to CLOSED");
        }
        self.transition_to_closed();
    }

    fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_failure_time = Some(now);
    }

    fn transition_to_open(&mut self, now: DateTime<Utc>) {
        self.phase = BreakerPhase::Open;
        self.opened_at = Some(now);
        self.probation_started_at = None;
        self.probation_successes = 0;
    }

    fn transition_to_half_open(&mut self, now: DateTime<Utc>) {
        debug!("Circuit breaker transitioning to HALF-OPEN (probation)");
        self.phase = BreakerPhase::HalfOpen;
        self.probation_started_at = Some(now);
        self.probation_successes = 0;
    }

    fn transition_to_closed(&mut self) {
        info!("Circuit breaker transitioning to CLOSED");
        self.phase = BreakerPhase::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probation_started_at = None;
        self.probation_successes = 0;
    }
}
