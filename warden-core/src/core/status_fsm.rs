//! Validation Status State Machine
//!
//! Fixed transition table consulted by every manual and automatic status
//! change. Fingerprint mismatch is the only path that bypasses the table: it
//! forces any status back to UNVALIDATED.
//!
//! # State Diagram
//!
//! ```text
//!   UNVALIDATED ──► VALIDATION_PENDING ──► VALIDATED ──manual──► APPROVED
//!        ▲                   │                 │  ▲                  │
//!        │                   ▼                 │  │ recovery         │
//!        │          VALIDATION_FAILED          ▼  │                  ▼
//!        │                              {QUARANTINED, CIRCUIT_BREAKER_OPEN,
//!        │                               EMERGENCY_SUSPENDED, DEPRECATED}
//!        │                                         │
//!        └────────── manual re-validation ◄────────┘
//! ```

use super::types::ValidationStatus;
use ValidationStatus::*;

/// How a transition is allowed to happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Driven by the validation pipeline
    Pipeline,
    /// Operator decision
    Manual,
    /// Raised by the monitor or breaker
    Automatic,
    /// Re-validation restarting at UNVALIDATED
    Revalidation,
}

/// Look up a transition in the table
pub fn transition_kind(from: ValidationStatus, to: ValidationStatus) -> Option<TransitionKind> {
    let kind = match (from, to) {
        (Unvalidated, ValidationPending) => TransitionKind::Pipeline,
        (ValidationPending, Validated) | (ValidationPending, ValidationFailed) => {
            TransitionKind::Pipeline
        }

        (Validated, Approved) => TransitionKind::Manual,

        (Validated | Approved, Quarantined) => TransitionKind::Automatic,
        (Validated | Approved, CircuitBreakerOpen) => TransitionKind::Automatic,
        (Validated | Approved, EmergencySuspended) => TransitionKind::Manual,
        (Validated | Approved, Deprecated) => TransitionKind::Manual,

        (CircuitBreakerOpen, Validated) => TransitionKind::Automatic,
        // Operator releases a quarantined strategy after review
        (Quarantined, Validated) => TransitionKind::Manual,

        (ValidationFailed | Deprecated | EmergencySuspended, Unvalidated) => {
            TransitionKind::Revalidation
        }
        (Quarantined | CircuitBreakerOpen, Unvalidated) => TransitionKind::Revalidation,

        _ => return None,
    };
    Some(kind)
}

#[inline]
pub fn can_transition(from: ValidationStatus, to: ValidationStatus) -> bool {
    transition_kind(from, to).is_some()
}

/// Every status reachable from `from` in one step
pub fn successors(from: ValidationStatus) -> Vec<ValidationStatus> {
    ValidationStatus::ALL
        .iter()
        .copied()
        .filter(|to| can_transition(from, *to))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_path() {
        assert!(can_transition(Unvalidated, ValidationPending));
        assert!(can_transition(ValidationPending, Validated));
        assert!(can_transition(ValidationPending, ValidationFailed));
        assert!(can_transition(Validated, Approved));
    }

    #[test]
    fn test_cannot_skip_validation() {
        assert!(!can_transition(Unvalidated, Validated));
        assert!(!can_transition(Unvalidated, Approved));
        assert!(!can_transition(ValidationPending, Approved));
        assert!(!can_transition(ValidationFailed, Validated));
    }

    #[test]
    fn test_terminal_statuses_only_restart_at_unvalidated() {
        for terminal in [ValidationFailed, Deprecated, EmergencySuspended] {
            assert!(terminal.is_terminal());
            assert_eq!(successors(terminal), vec![Unvalidated]);
            assert_eq!(
                transition_kind(terminal, Unvalidated),
                Some(TransitionKind::Revalidation)
            );
        }
    }

    #[test]
    fn test_breaker_recovery_goes_to_validated_only() {
        assert!(can_transition(CircuitBreakerOpen, Validated));
        assert!(!can_transition(CircuitBreakerOpen, Approved));
    }

    #[test]
    fn test_suspensions_from_approvable_states() {
        for from in [Validated, Approved] {
            for to in [Quarantined, CircuitBreakerOpen, EmergencySuspended, Deprecated] {
                assert!(can_transition(from, to), "{from} -> {to}");
            }
        }
        assert!(!can_transition(Unvalidated, Quarantined));
    }

    #[test]
    fn test_no_self_transitions() {
        for status in ValidationStatus::ALL {
            assert!(!can_transition(status, status), "{status} -> {status}");
        }
    }
}
