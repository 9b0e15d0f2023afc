//! Strategy versions
//!
//! A version binds a strategy name to one fingerprint. A new fingerprint
//! always produces a new version; the previous one is archived verbatim.

use crate::core::{PerformanceMetrics, ValidationStatus};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyVersion {
    /// `{name}-v{sequence}-{fingerprint prefix}`
    pub version_id: String,
    pub strategy_name: String,
    /// 1-based, increases with every new version of the strategy
    pub sequence: u32,
    pub code_fingerprint: Fingerprint,
    pub creation_date: DateTime<Utc>,
    pub validation_status: ValidationStatus,
    /// Baseline from the backtest that validated this version
    pub performance_metrics: Option<PerformanceMetrics>,
    pub backtest_samples: u64,
}

impl StrategyVersion {
    pub fn new(
        strategy_name: &str,
        sequence: u32,
        code_fingerprint: Fingerprint,
        creation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            version_id: format!(
                "{}-v{}-{}",
                strategy_name,
                sequence,
                code_fingerprint.short()
            ),
            strategy_name: strategy_name.to_string(),
            sequence,
            code_fingerprint,
            creation_date,
            validation_status: ValidationStatus::Unvalidated,
            performance_metrics: None,
            backtest_samples: 0,
        }
    }

    /// Next version of the same strategy, starting UNVALIDATED
    pub fn successor(&self, code_fingerprint: Fingerprint, creation_date: DateTime<Utc>) -> Self {
        Self::new(
            &self.strategy_name,
            self.sequence + 1,
            code_fingerprint,
            creation_date,
        )
    }
}
