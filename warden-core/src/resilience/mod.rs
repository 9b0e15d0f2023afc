//! Resilience primitives
//!
//! - `circuit_breaker`: per-strategy Closed/Open/HalfOpen breaker state
//! - `emergency`: global kill switch and per-strategy emergency suspension

pub mod circuit_breaker;
pub mod emergency;

pub use circuit_breaker::{BreakerConfig, BreakerEvent, BreakerPhase, CircuitBreakerState};
pub use emergency::{EmergencyAction, EmergencyAuditEntry, EmergencyControls, Suspension};
