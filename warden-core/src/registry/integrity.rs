//! Startup integrity check
//!
//! Any violation means the approved set cannot be trusted. The gate reacts
//! by entering failover: registry unhealthy, approved set emptied, every
//! decision blocked until an operator restores health.

use super::record::ValidationRecord;
use crate::core::ValidationStatus;
use crate::resilience::EmergencyControls;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityViolation {
    ApprovedWithoutRecord {
        strategy: String,
    },
    ApprovedWithInvalidStatus {
        strategy: String,
        status: ValidationStatus,
    },
    ApprovedWithOpenBreaker {
        strategy: String,
    },
    ApprovedDuringEmergency {
        strategy: String,
    },
    VersionNameMismatch {
        key: String,
        version_id: String,
        strategy_name: String,
    },
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApprovedWithoutRecord { strategy } => {
                write!(f, "approved strategy '{}' has no validation record", strategy)
            }
            Self::ApprovedWithInvalidStatus { strategy, status } => {
                write!(f, "approved strategy '{}' has status {}", strategy, status)
            }
            Self::ApprovedWithOpenBreaker { strategy } => {
                write!(f, "approved strategy '{}' has an open circuit breaker", strategy)
            }
            Self::ApprovedDuringEmergency { strategy } => {
                write!(
                    f,
                    "strategy '{}' is approved while an emergency control blocks it",
                    strategy
                )
            }
            Self::VersionNameMismatch {
                key,
                version_id,
                strategy_name,
            } => write!(
                f,
                "record '{}' holds version {} of '{}'",
                key, version_id, strategy_name
            ),
        }
    }
}

/// Verify the approved set and the records against each other
pub fn check(
    approved: &BTreeSet<String>,
    records: &BTreeMap<String, ValidationRecord>,
    emergency: &EmergencyControls,
) -> Vec<IntegrityViolation> {
    let mut violations = Vec::new();

    for name in approved {
        match records.get(name) {
            None => violations.push(IntegrityViolation::ApprovedWithoutRecord {
                strategy: name.clone(),
            }),
            Some(record) => {
                if !record.status().is_approvable() {
                    violations.push(IntegrityViolation::ApprovedWithInvalidStatus {
                        strategy: name.clone(),
                        status: record.status(),
                    });
                }
                if record.circuit_breaker.is_open() {
                    violations.push(IntegrityViolation::ApprovedWithOpenBreaker {
                        strategy: name.clone(),
                    });
                }
            }
        }
        if emergency.blocks(name) {
            violations.push(IntegrityViolation::ApprovedDuringEmergency {
                strategy: name.clone(),
            });
        }
    }

    for (key, record) in records {
        let versions = std::iter::once(&record.current_version).chain(&record.archived_versions);
        for version in versions {
            if &version.strategy_name != key || &record.strategy_name != key {
                violations.push(IntegrityViolation::VersionNameMismatch {
                    key: key.clone(),
                    version_id: version.version_id.clone(),
                    strategy_name: version.strategy_name.clone(),
                });
            }
        }
    }

    violations
}
