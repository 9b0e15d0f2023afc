//! Versioned on-disk registry format
//!
//! Version 2 is the current schema. Version 1 files (no `format_version`
//! field, flat `approved_strategies` / `validation_records` /
//! `emergency_controls` keys) are migrated on load. Anything newer than the
//! current version is rejected as corruption rather than guessed at.

use super::record::{HistoryEntry, RecordTemplate, ValidationRecord};
use crate::core::{PerformanceMetrics, RegistryError, ValidationStatus};
use crate::fingerprint::Fingerprint;
use crate::gate::DailyUsage;
use crate::resilience::EmergencyControls;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

pub const CURRENT_FORMAT_VERSION: u32 = 2;

/// Whole-registry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub approved: BTreeSet<String>,
    pub emergency: EmergencyControls,
    /// Present while the registry is in failover; survives restarts
    #[serde(default)]
    pub failover: Option<FailoverState>,
    pub records: BTreeMap<String, ValidationRecord>,
    /// Today's recommendation counts per strategy
    #[serde(default)]
    pub quota: BTreeMap<String, DailyUsage>,
    /// Format the snapshot was read from when it had to be migrated
    #[serde(skip)]
    pub migrated_from: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverState {
    pub since: DateTime<Utc>,
    pub reason: String,
}

impl RegistrySnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            format_version: CURRENT_FORMAT_VERSION,
            saved_at: now,
            approved: BTreeSet::new(),
            emergency: EmergencyControls::default(),
            failover: None,
            records: BTreeMap::new(),
            quota: BTreeMap::new(),
            migrated_from: None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, RegistryError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse any supported format version; `path` is only used in errors
    ///
    /// Outcome windows are resized to the configured window size. `now`
    /// stamps migrated records that carry no timestamp of their own.
    pub fn decode(
        bytes: &[u8],
        path: &Path,
        template: &RecordTemplate,
        now: DateTime<Utc>,
    ) -> Result<Self, RegistryError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| RegistryError::corruption(path, format!("invalid JSON: {}", e)))?;

        let version = match value.get("format_version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| RegistryError::corruption(path, "format_version is not a number"))?,
        };

        match version {
            1 => {
                let legacy: LegacySnapshot = serde_json::from_value(value).map_err(|e| {
                    RegistryError::corruption(path, format!("invalid v1 registry: {}", e))
                })?;
                info!("Migrating v1 registry at {:?} to format v{}", path, CURRENT_FORMAT_VERSION);
                legacy.migrate(path, template, now)
            }
            2 => {
                let mut snapshot: RegistrySnapshot = serde_json::from_value(value).map_err(|e| {
                    RegistryError::corruption(path, format!("invalid v2 registry: {}", e))
                })?;
                for record in snapshot.records.values_mut() {
                    if record.live_outcomes.capacity() != template.window_size {
                        record.live_outcomes.resize(template.window_size);
                    }
                }
                Ok(snapshot)
            }
            other => Err(RegistryError::corruption(
                path,
                format!(
                    "unsupported format_version {} (newest known is {})",
                    other, CURRENT_FORMAT_VERSION
                ),
            )),
        }
    }

    /// Whether `bytes` look like a v1 registry: a JSON object without `format_version`
    pub fn is_unversioned(bytes: &[u8]) -> bool {
        serde_json::from_slice::<serde_json::Value>(bytes)
            .ok()
            .and_then(|v| v.as_object().map(|o| !o.contains_key("format_version")))
            .unwrap_or(false)
    }

    /// Statuses of every strategy, for comparing snapshots
    pub fn statuses(&self) -> BTreeMap<String, ValidationStatus> {
        self.records
            .iter()
            .map(|(name, record)| (name.clone(), record.status()))
            .collect()
    }
}

/// v1 layout: a flat dictionary written by the first registry generation
#[derive(Debug, Deserialize)]
struct LegacySnapshot {
    #[serde(default)]
    approved_strategies: Vec<String>,
    #[serde(default)]
    validation_records: BTreeMap<String, LegacyRecord>,
    #[serde(default)]
    emergency_controls: Option<LegacyEmergency>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LegacyRecord {
    strategy_name: String,
    code_fingerprint: String,
    validation_status: ValidationStatus,
    #[serde(default)]
    performance_metrics: Option<PerformanceMetrics>,
    #[serde(default)]
    backtest_samples: u64,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    max_daily_recommendations: Option<u32>,
    #[serde(default)]
    max_bet_size_multiplier: Option<f64>,
    #[serde(default)]
    requires_manual_approval: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LegacyEmergency {
    #[serde(default)]
    kill_switch_active: bool,
    #[serde(default)]
    activated_by: Option<String>,
    #[serde(default)]
    activation_time: Option<DateTime<Utc>>,
    #[serde(default)]
    reason: Option<String>,
}

impl LegacySnapshot {
    fn migrate(
        self,
        path: &Path,
        template: &RecordTemplate,
        loaded_at: DateTime<Utc>,
    ) -> Result<RegistrySnapshot, RegistryError> {
        let now = self.last_updated.unwrap_or(loaded_at);
        let mut records = BTreeMap::new();

        for (key, legacy) in self.validation_records {
            let fingerprint = Fingerprint::from_hex(&legacy.code_fingerprint).map_err(|e| {
                RegistryError::corruption(path, format!("record '{}': {}", key, e))
            })?;
            let created = legacy.created_at.unwrap_or(now);

            let mut record =
                ValidationRecord::new(&legacy.strategy_name, fingerprint, template, "migration", created);
            record.current_version.validation_status = legacy.validation_status;
            if let Some(metrics) = legacy.performance_metrics {
                record.set_baseline(metrics, legacy.backtest_samples);
            }
            if let Some(v) = legacy.max_daily_recommendations {
                record.constraints.max_daily_recommendations = v;
            }
            if let Some(v) = legacy.max_bet_size_multiplier {
                record.constraints.max_bet_size_multiplier = v;
            }
            if let Some(v) = legacy.requires_manual_approval {
                record.constraints.requires_manual_approval = v;
            }
            record.validation_history.push(HistoryEntry {
                at: now,
                from: Some(ValidationStatus::Unvalidated),
                to: legacy.validation_status,
                actor: "migration".to_string(),
                reason: "imported from format v1".to_string(),
                version_id: record.current_version.version_id.clone(),
            });

            // Key mismatches are kept as-is so the integrity check can see them
            records.insert(key, record);
        }

        let mut emergency = EmergencyControls::default();
        if let Some(legacy) = self.emergency_controls {
            emergency.kill_switch_active = legacy.kill_switch_active;
            emergency.activated_by = legacy.activated_by;
            emergency.activation_time = legacy.activation_time;
            emergency.reason = legacy.reason;
        }

        Ok(RegistrySnapshot {
            format_version: CURRENT_FORMAT_VERSION,
            saved_at: now,
            approved: self.approved_strategies.into_iter().collect(),
            emergency,
            failover: None,
            records,
            quota: BTreeMap::new(),
            migrated_from: Some(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeSample;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn path() -> PathBuf {
        PathBuf::from("registry.json")
    }

    fn decode(bytes: &[u8], now: DateTime<Utc>) -> Result<RegistrySnapshot, RegistryError> {
        RegistrySnapshot::decode(bytes, &path(), &RecordTemplate::default(), now)
    }

    #[test]
    fn test_v2_round_trip() {
        let now = Utc::now();
        let mut snapshot = RegistrySnapshot::empty(now);
        let fp = Fingerprint::compute("sharp_action", b"v1");
        let record =
            ValidationRecord::new("sharp_action", fp, &RecordTemplate::default(), "system", now);
        snapshot.records.insert("sharp_action".to_string(), record);

        let bytes = snapshot.encode().unwrap();
        let decoded = decode(&bytes, now).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(decoded.migrated_from.is_none());
    }

    #[test]
    fn test_windows_resized_to_configured_size() {
        let now = Utc::now();
        let mut snapshot = RegistrySnapshot::empty(now);
        let fp = Fingerprint::compute("sharp_action", b"v1");
        let wide = RecordTemplate {
            window_size: 80,
            ..RecordTemplate::default()
        };
        let mut record = ValidationRecord::new("sharp_action", fp, &wide, "system", now);
        for i in 0..70 {
            record.push_outcome(OutcomeSample::new(i % 2 == 0, 0.1, now));
        }
        snapshot.records.insert("sharp_action".to_string(), record);

        let decoded = decode(&snapshot.encode().unwrap(), now).unwrap();
        let window = &decoded.records["sharp_action"].live_outcomes;
        assert_eq!(window.capacity(), 50);
        assert_eq!(window.len(), 50);
    }

    #[test]
    fn test_v1_migration() {
        let fp = Fingerprint::compute("steam_move", b"legacy");
        let legacy = serde_json::json!({
            "approved_strategies": ["steam_move"],
            "validation_records": {
                "steam_move": {
                    "strategy_name": "steam_move",
                    "code_fingerprint": fp.to_hex(),
                    "validation_status": "APPROVED",
                    "performance_metrics": {
                        "win_rate": 0.55, "roi": 0.04, "sample_size": 300, "confidence_score": 0.7
                    },
                    "backtest_samples": 300,
                    "max_daily_recommendations": 4
                }
            },
            "emergency_controls": { "kill_switch_active": false }
        });
        let bytes = serde_json::to_vec(&legacy).unwrap();
        assert!(RegistrySnapshot::is_unversioned(&bytes));

        let loaded_at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let snapshot = decode(&bytes, loaded_at).unwrap();

        assert_eq!(snapshot.format_version, CURRENT_FORMAT_VERSION);
        assert_eq!(snapshot.migrated_from, Some(1));
        assert_eq!(snapshot.saved_at, loaded_at);
        assert!(snapshot.approved.contains("steam_move"));
        let record = &snapshot.records["steam_move"];
        assert_eq!(record.status(), ValidationStatus::Approved);
        assert_eq!(record.fingerprint(), fp);
        assert_eq!(record.constraints.max_daily_recommendations, 4);
        assert_eq!(record.current_version.backtest_samples, 300);
        // No timestamps in the legacy record: the load time stands in
        assert!(record.validation_history.iter().all(|h| h.at == loaded_at));
    }

    #[test]
    fn test_future_version_is_corruption() {
        let bytes = br#"{"format_version": 99}"#;
        assert!(!RegistrySnapshot::is_unversioned(bytes));
        let err = decode(bytes, Utc::now()).unwrap_err();
        assert!(matches!(err, RegistryError::Corruption { .. }));
    }

    #[test]
    fn test_garbage_is_corruption() {
        assert!(!RegistrySnapshot::is_unversioned(b"{not json"));
        let err = decode(b"{not json", Utc::now()).unwrap_err();
        assert!(err.is_trust_breaking());
    }
}
