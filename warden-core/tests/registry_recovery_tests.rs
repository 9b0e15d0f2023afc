//! Registry persistence and recovery tests
//!
//! Covers the on-disk lifecycle of the registry across restarts: reload,
//! corrupt primaries, integrity failover, operator restore and migration
//! of the first-generation file format.

use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use warden_core::core::ManualClock;
use warden_core::gate::{DenialCategory, RestoreOutcome, ValidationGate};
use warden_core::registry::store::write_checksummed;
use warden_core::registry::{RecordTemplate, RegistrySnapshot, ValidationRecord};
use warden_core::testing::StaticDefinition;
use warden_core::{
    BacktestResult, Clock, Fingerprint, GateConfig, OperationalConstraints, ValidationStatus,
};

fn config(dir: &Path) -> GateConfig {
    let mut config = GateConfig::rooted_at(dir);
    config.alerts.outputs.clear();
    config
}

fn open(dir: &Path, clock: &ManualClock) -> ValidationGate {
    ValidationGate::builder(config(dir))
        .clock(Arc::new(clock.clone()))
        .open()
        .unwrap()
}

fn validate(gate: &ValidationGate, name: &str) {
    gate.register_strategy(Arc::new(StaticDefinition::new(name, "v1")))
        .unwrap();
    gate.begin_validation(name, "ci").unwrap();
    gate.apply_backtest(
        &BacktestResult {
            strategy_name: name.to_string(),
            total_bets: 300,
            wins: 165,
            win_rate: 0.55,
            roi_per_100: 3.1,
            confidence_score: 0.75,
        },
        "ci",
    )
    .unwrap();
}

/// A VALIDATED record whose fingerprint matches `StaticDefinition::new(name, "v1")`
fn validated_record(name: &str, now: DateTime<Utc>) -> ValidationRecord {
    let fp = Fingerprint::compute(name, b"v1");
    let mut record = ValidationRecord::new(name, fp, &RecordTemplate::default(), "system", now);
    record
        .transition(ValidationStatus::ValidationPending, "ci", "backtest", now)
        .unwrap();
    record
        .transition(ValidationStatus::Validated, "ci", "passed", now)
        .unwrap();
    record
}

/// Test: statuses, approvals and emergency state survive a restart
#[test]
fn test_snapshot_round_trip_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();

    let before = {
        let gate = open(dir.path(), &clock);
        validate(&gate, "sharp_action");
        validate(&gate, "steam_move");
        gate.emergency_suspend("steam_move", "opA", "bad feed").unwrap();
        gate.register_strategy(Arc::new(StaticDefinition::new("fresh", "v1")))
            .unwrap();
        gate.snapshot()
    };

    let gate = open(dir.path(), &clock);
    assert!(gate.is_healthy());
    let after = gate.snapshot();

    assert_eq!(after.statuses(), before.statuses());
    assert_eq!(after.approved, before.approved);
    assert_eq!(after.emergency, before.emergency);
    assert_eq!(after.records, before.records);

    gate.attach_definition(Arc::new(StaticDefinition::new("sharp_action", "v1")));
    assert!(gate.check("sharp_action").allowed);
}

/// Test: a corrupt primary is moved aside and the newest backup restored
///
/// 1. Validate a strategy and take a backup
/// 2. Overwrite the primary with garbage (checksum no longer matches)
/// 3. Reopen: state comes from the backup, a critical alert is raised
/// 4. The corrupt file is kept next to the registry for inspection
#[test]
fn test_corrupt_primary_restored_from_backup() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();

    // Step 1
    {
        let gate = open(dir.path(), &clock);
        validate(&gate, "sharp_action");
        gate.backup_now().unwrap();
    }

    // Step 2
    std::fs::write(dir.path().join("registry.json"), b"{\"approved\": [\"everything\"").unwrap();
    clock.advance_secs(60);

    // Step 3
    let gate = open(dir.path(), &clock);
    assert!(gate.is_healthy());
    assert!(gate.is_approved("sharp_action"));
    let health = gate.health();
    assert!(health.restored_from_backup.is_some());

    gate.alerts().flush();
    assert!(gate
        .alerts()
        .recent()
        .iter()
        .any(|a| a.id.name == "registry_restored_from_backup"));

    // Step 4
    let quarantined = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("registry.corrupt-")
        });
    assert!(quarantined);

    // The restored state was written back as a valid primary
    drop(gate);
    let gate = open(dir.path(), &clock);
    assert!(gate.health().restored_from_backup.is_none());
    assert!(gate.is_approved("sharp_action"));
}

/// Test: a corrupt primary with no backup leaves the gate in failover
#[test]
fn test_corrupt_primary_without_backup_fails_over() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    {
        let gate = open(dir.path(), &clock);
        validate(&gate, "sharp_action");
    }
    std::fs::write(dir.path().join("registry.json"), b"not json at all").unwrap();

    let gate = open(dir.path(), &clock);
    assert!(!gate.is_healthy());
    assert!(gate.approved_strategies().is_empty());
    assert_eq!(
        gate.check("sharp_action").category,
        Some(DenialCategory::RegistryUnhealthy)
    );
}

/// Test: an approved name without a record fails the integrity check
///
/// 1. Craft a checksummed registry approving `ghost` (no record) and `real`
/// 2. Open: failover, approved set emptied, every check blocked
/// 3. Restore health: approvals rebuilt from the records alone
#[test]
fn test_integrity_violation_fails_over_until_restored() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let now = clock.now();

    // Step 1
    let mut snapshot = RegistrySnapshot::empty(now);
    snapshot
        .records
        .insert("real".to_string(), validated_record("real", now));
    snapshot.approved.insert("real".to_string());
    snapshot.approved.insert("ghost".to_string());
    write_checksummed(
        &dir.path().join("registry.json"),
        &snapshot.encode().unwrap(),
    )
    .unwrap();

    // Step 2
    let gate = open(dir.path(), &clock);
    gate.attach_definition(Arc::new(StaticDefinition::new("real", "v1")));

    assert!(!gate.is_healthy());
    assert!(gate.approved_strategies().is_empty());
    let health = gate.health();
    assert_eq!(health.violations.len(), 1);
    assert!(health.violations[0].contains("ghost"));
    assert!(health.failover_reason.is_some());

    for name in ["real", "ghost"] {
        assert_eq!(
            gate.check(name).category,
            Some(DenialCategory::RegistryUnhealthy)
        );
    }
    // Nothing can be approved while unhealthy
    assert!(gate.promote("real", ValidationStatus::Approved, "opA").is_err());

    // Step 3
    assert!(gate.restore_health("").is_err());
    match gate.restore_health("opA").unwrap() {
        RestoreOutcome::Restored { approved } => assert_eq!(approved, vec!["real".to_string()]),
        other => panic!("expected restore, got {:?}", other),
    }
    assert!(gate.is_healthy());
    assert!(gate.check("real").allowed);
    assert_eq!(
        gate.check("ghost").category,
        Some(DenialCategory::UnknownStrategy)
    );
    assert!(matches!(
        gate.restore_health("opA").unwrap(),
        RestoreOutcome::AlreadyHealthy
    ));
}

/// Test: failover survives a restart until an operator clears it
#[test]
fn test_failover_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let now = clock.now();

    let mut snapshot = RegistrySnapshot::empty(now);
    snapshot.approved.insert("ghost".to_string());
    write_checksummed(
        &dir.path().join("registry.json"),
        &snapshot.encode().unwrap(),
    )
    .unwrap();

    {
        let gate = open(dir.path(), &clock);
        assert!(!gate.is_healthy());
        gate.persist().unwrap();
    }

    let gate = open(dir.path(), &clock);
    assert!(!gate.is_healthy());
    assert!(gate.snapshot().failover.is_some());

    assert!(matches!(
        gate.restore_health("opA").unwrap(),
        RestoreOutcome::Restored { .. }
    ));
    drop(gate);
    assert!(open(dir.path(), &clock).is_healthy());
}

/// First-generation registry approving `steam_move` at fingerprint v1
fn legacy_registry() -> serde_json::Value {
    let fp = Fingerprint::compute("steam_move", b"v1");
    serde_json::json!({
        "approved_strategies": ["steam_move"],
        "validation_records": {
            "steam_move": {
                "strategy_name": "steam_move",
                "code_fingerprint": fp.to_hex(),
                "validation_status": "APPROVED",
                "performance_metrics": {
                    "win_rate": 0.55, "roi": 0.04, "sample_size": 300, "confidence_score": 0.7
                },
                "backtest_samples": 300
            }
        },
        "emergency_controls": { "kill_switch_active": false },
        "last_updated": "2025-02-01T09:30:00Z"
    })
}

/// Test: a first-generation registry file is migrated on load
#[test]
fn test_v1_registry_migrated() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let path = dir.path().join("registry.json");
    write_checksummed(&path, &serde_json::to_vec_pretty(&legacy_registry()).unwrap()).unwrap();

    let gate = open(dir.path(), &clock);
    assert!(gate.is_healthy());
    assert!(gate.is_approved("steam_move"));
    gate.attach_definition(Arc::new(StaticDefinition::new("steam_move", "v1")));
    assert!(gate.check("steam_move").allowed);

    // Migration rewrites the file in the current format
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written["format_version"], serde_json::json!(2));
}

/// Test: a first-generation file predating checksums is migrated, not quarantined
///
/// 1. Write a v1 registry with no `.sha256` file next to it
/// 2. Open: healthy, nothing restored, the approval carried over
/// 3. The file was rewritten as v2 with a checksum, and reloads cleanly
#[test]
fn test_unchecksummed_v1_registry_migrated() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let path = dir.path().join("registry.json");

    // Step 1
    std::fs::write(&path, serde_json::to_vec_pretty(&legacy_registry()).unwrap()).unwrap();
    assert!(!dir.path().join("registry.sha256").exists());

    // Step 2
    let gate = open(dir.path(), &clock);
    assert!(gate.is_healthy());
    assert!(gate.health().restored_from_backup.is_none());
    assert!(gate.is_approved("steam_move"));
    assert_eq!(
        gate.record("steam_move").unwrap().status(),
        ValidationStatus::Approved
    );
    let corrupt_copies = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("registry.corrupt-"))
        .count();
    assert_eq!(corrupt_copies, 0);

    // Step 3
    assert!(dir.path().join("registry.sha256").exists());
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written["format_version"], serde_json::json!(2));

    drop(gate);
    let gate = open(dir.path(), &clock);
    assert!(gate.is_healthy());
    gate.attach_definition(Arc::new(StaticDefinition::new("steam_move", "v1")));
    assert!(gate.check("steam_move").allowed);
}

/// Test: a checksum-less file that is not a legacy registry is still corruption
#[test]
fn test_unchecksummed_current_format_is_not_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    let mut snapshot = RegistrySnapshot::empty(clock.now());
    snapshot.approved.insert("steam_move".to_string());
    std::fs::write(dir.path().join("registry.json"), snapshot.encode().unwrap()).unwrap();

    let gate = open(dir.path(), &clock);
    assert!(!gate.is_healthy());
    assert!(gate.approved_strategies().is_empty());
}

/// Test: the kill switch is still active after a restart
#[test]
fn test_kill_switch_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::default();
    {
        let gate = open(dir.path(), &clock);
        validate(&gate, "sharp_action");
        gate.activate_kill_switch("opA", "market halt").unwrap();
    }

    let gate = open(dir.path(), &clock);
    assert!(gate.kill_switch_active());
    gate.attach_definition(Arc::new(StaticDefinition::new("sharp_action", "v1")));
    let decision = gate.check("sharp_action");
    assert_eq!(decision.category, Some(DenialCategory::Emergency));
    assert_eq!(
        gate.record("sharp_action").unwrap().status(),
        ValidationStatus::EmergencySuspended
    );
}

/// Test: the daily recommendation budget is not refilled by a restart
///
/// 1. Spend two of a three-per-day budget
/// 2. Reopen on the same directory: one left, then exhausted
/// 3. The next UTC day starts from zero
#[test]
fn test_daily_quota_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());

    // Step 1
    {
        let gate = open(dir.path(), &clock);
        validate(&gate, "sharp_action");
        gate.set_constraints(
            "sharp_action",
            OperationalConstraints {
                max_daily_recommendations: 3,
                ..Default::default()
            },
            "opA",
        )
        .unwrap();
        gate.attach_definition(Arc::new(StaticDefinition::new("sharp_action", "v1")));
        assert!(gate.authorize_recommendation("sharp_action").allowed);
        assert!(gate.authorize_recommendation("sharp_action").allowed);
        assert_eq!(gate.quota_used("sharp_action"), 2);
    }

    // Step 2
    let gate = open(dir.path(), &clock);
    gate.attach_definition(Arc::new(StaticDefinition::new("sharp_action", "v1")));
    assert_eq!(gate.quota_used("sharp_action"), 2);
    assert_eq!(
        gate.authorize_recommendation("sharp_action").quota_remaining,
        Some(0)
    );
    assert_eq!(
        gate.authorize_recommendation("sharp_action").category,
        Some(DenialCategory::QuotaExhausted)
    );

    // Step 3
    drop(gate);
    clock.advance(chrono::Duration::days(1));
    let gate = open(dir.path(), &clock);
    gate.attach_definition(Arc::new(StaticDefinition::new("sharp_action", "v1")));
    assert_eq!(gate.quota_used("sharp_action"), 0);
    assert!(gate.snapshot().quota.is_empty());
    assert!(gate.authorize_recommendation("sharp_action").allowed);
}
