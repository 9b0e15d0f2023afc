//! Warden Core - Strategy Validation Gate
//!
//! Warden decides, per strategy and per call, whether a betting strategy may
//! emit live recommendations. A strategy is allowed only while its code is
//! exactly the code that was validated, its live performance has not
//! degraded, its circuit breaker is closed and no emergency control is
//! active.
//!
//! ## Architecture
//! - **Explicit service**: one [`ValidationGate`] owns the registry, the
//!   background loops and their shutdown; no global state
//! - **Fingerprints** over canonical strategy representations, cached with
//!   explicit invalidation
//! - **Per-record locking** under one global lock for the approved set and
//!   emergency controls
//! - **Checksummed, atomic persistence** with timestamped backups and
//!   failover on any sign of corruption
//!
//! ## Core Modules
//! - `core`: statuses, outcome window, errors, transition table, clock
//! - `fingerprint`: strategy definitions and the cached fingerprint computer
//! - `analysis`: rolling-window degradation analysis and backtest criteria
//! - `resilience`: circuit breaker and emergency controls
//! - `registry`: records, versions, snapshot format, store, backups, integrity
//! - `gate`: the decision API and every state-changing operation
//! - `monitor`: periodic re-evaluation and outcome feeds
//! - `monitoring`: alerts, Prometheus metrics, `/metrics` and `/health`

pub mod analysis;
pub mod config;
pub mod core;
pub mod fingerprint;
pub mod gate;
pub mod monitor;
pub mod monitoring;
pub mod registry;
pub mod resilience;
pub mod utils;

// Test helpers, also used by downstream crates' tests and simulations
pub mod testing;

pub use crate::core::{
    BacktestResult, Clock, GateError, LiveOutcome, OperationalConstraints, OutcomeSample,
    PerformanceMetrics, ValidationStatus,
};
pub use config::GateConfig;
pub use fingerprint::{Fingerprint, StrategyDefinition};
pub use gate::{DenialCategory, GateDecision, Remedy, ValidationGate};
pub use monitor::{CycleReport, OutcomeFeed};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::GateConfig;
    pub use crate::core::{
        BacktestResult, Clock, GateError, LiveOutcome, ManualClock, OperationalConstraints,
        OutcomeSample, SystemClock, ValidationError, ValidationStatus,
    };
    pub use crate::fingerprint::{Fingerprint, StrategyDefinition};
    pub use crate::gate::{
        AssessmentAction, DenialCategory, GateDecision, KillSwitchOutcome, RegistryHealth,
        Remedy, RestoreOutcome, ValidationGate,
    };
    pub use crate::monitor::{CycleReport, JsonlOutcomeFeed, MemoryFeed, OutcomeFeed};
    pub use crate::monitoring::{Alert, AlertCategory, AlertSeverity, AlertSink};
}
