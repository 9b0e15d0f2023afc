//! Core types for the validation gate
//!
//! - `types`: statuses, outcome samples, baseline metrics, constraints
//! - `status_fsm`: fixed status transition table
//! - `errors`: error taxonomy
//! - `clock`: wall-clock abstraction

pub mod clock;
pub mod errors;
pub mod status_fsm;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{FingerprintError, GateError, RegistryError, ValidationError};
pub use status_fsm::{can_transition, transition_kind, TransitionKind};
pub use types::{
    BacktestResult, LiveOutcome, OperationalConstraints, OutcomeSample, OutcomeWindow,
    PerformanceMetrics, ValidationStatus,
};
