//! Property tests for gate decisions
//!
//! Random mixes of strategy states must never let a strategy through while
//! the kill switch is active, and a healthy VALIDATED/APPROVED strategy must
//! never be blocked by what happens to its neighbours.

use proptest::prelude::*;
use std::sync::Arc;
use warden_core::analysis::BreakerTrigger;
use warden_core::core::ManualClock;
use warden_core::gate::{DenialCategory, ValidationGate};
use warden_core::testing::StaticDefinition;
use warden_core::{GateConfig, ValidationStatus};

#[derive(Debug, Clone, Copy)]
enum Setup {
    Unvalidated,
    Pending,
    Validated,
    Approved,
    Failed,
    BreakerOpen,
    Quarantined,
    Suspended,
    CodeChanged,
}

fn setup_strategy() -> impl Strategy<Value = Setup> {
    prop_oneof![
        Just(Setup::Unvalidated),
        Just(Setup::Pending),
        Just(Setup::Validated),
        Just(Setup::Approved),
        Just(Setup::Failed),
        Just(Setup::BreakerOpen),
        Just(Setup::Quarantined),
        Just(Setup::Suspended),
        Just(Setup::CodeChanged),
    ]
}

fn open_gate(dir: &std::path::Path) -> ValidationGate {
    let mut config = GateConfig::rooted_at(dir);
    config.alerts.outputs.clear();
    ValidationGate::builder(config)
        .clock(Arc::new(ManualClock::default()))
        .open()
        .unwrap()
}

/// Put strategy `name` into the state described by `setup`
fn apply(gate: &ValidationGate, name: &str, setup: Setup) {
    let def = Arc::new(StaticDefinition::new(name, "v1"));
    gate.register_strategy(def.clone()).unwrap();
    if matches!(setup, Setup::Unvalidated) {
        return;
    }
    gate.begin_validation(name, "ci").unwrap();
    if matches!(setup, Setup::Pending) {
        return;
    }
    if matches!(setup, Setup::Failed) {
        gate.promote(name, ValidationStatus::ValidationFailed, "ci")
            .unwrap();
        return;
    }
    gate.promote(name, ValidationStatus::Validated, "ci").unwrap();

    match setup {
        Setup::Approved => {
            gate.promote(name, ValidationStatus::Approved, "opA").unwrap();
        }
        Setup::BreakerOpen => {
            let trigger = BreakerTrigger::LossStreak {
                streak: 5,
                threshold: 5,
            };
            assert!(gate.trip_breaker(name, &trigger).unwrap());
        }
        Setup::Quarantined => {
            gate.promote(name, ValidationStatus::Quarantined, "opA")
                .unwrap();
        }
        Setup::Suspended => {
            gate.emergency_suspend(name, "opA", "review").unwrap();
        }
        Setup::CodeChanged => {
            def.set_source("v2");
            gate.refresh_fingerprint(name);
        }
        _ => {}
    }
}

fn is_clean(setup: Setup) -> bool {
    matches!(setup, Setup::Validated | Setup::Approved)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: with the kill switch on, every check is an emergency denial
    #[test]
    fn prop_kill_switch_dominates(setups in prop::collection::vec(setup_strategy(), 1..6)) {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path());
        for (i, setup) in setups.iter().enumerate() {
            apply(&gate, &format!("s{}", i), *setup);
        }

        gate.activate_kill_switch("opA", "drill").unwrap();

        for i in 0..setups.len() {
            let decision = gate.check(&format!("s{}", i));
            prop_assert!(!decision.allowed);
            prop_assert_eq!(decision.category, Some(DenialCategory::Emergency));
        }
        prop_assert!(gate.approved_strategies().is_empty());
        prop_assert!(gate.snapshot().approved.is_empty());
    }

    /// Property: exactly the clean strategies are allowed
    #[test]
    fn prop_only_clean_strategies_allowed(setups in prop::collection::vec(setup_strategy(), 1..8)) {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path());
        for (i, setup) in setups.iter().enumerate() {
            apply(&gate, &format!("s{}", i), *setup);
        }

        for (i, setup) in setups.iter().enumerate() {
            let name = format!("s{}", i);
            let decision = gate.check(&name);
            prop_assert_eq!(decision.allowed, is_clean(*setup), "{:?}: {}", setup, decision);
            if decision.allowed {
                prop_assert!(decision.constraints.is_some());
                prop_assert!(gate.is_approved(&name));
            } else {
                prop_assert!(decision.category.is_some());
                prop_assert!(!decision.reason.is_empty());
                prop_assert!(!gate.is_approved(&name));
            }
        }
        prop_assert!(gate.is_healthy());
    }

    /// Property: the approved set is always a subset of approvable records
    #[test]
    fn prop_approved_set_consistent(setups in prop::collection::vec(setup_strategy(), 1..8)) {
        let dir = tempfile::tempdir().unwrap();
        let gate = open_gate(dir.path());
        for (i, setup) in setups.iter().enumerate() {
            apply(&gate, &format!("s{}", i), *setup);
        }

        let snapshot = gate.snapshot();
        for name in &snapshot.approved {
            let record = &snapshot.records[name];
            prop_assert!(record.status().is_approvable());
            prop_assert!(!record.circuit_breaker.is_open());
            prop_assert!(!snapshot.emergency.blocks(name));
        }
    }
}
