//! Per-strategy daily recommendation budget
//!
//! Counts reset at the UTC day boundary. Usage is carried in the registry
//! snapshot, so a restart resumes the current day's count.

use chrono::NaiveDate;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Recommendations authorized for one strategy on one day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub day: NaiveDate,
    pub used: u32,
}

#[derive(Debug, Default)]
pub struct DailyQuota {
    usage: DashMap<String, DailyUsage>,
}

impl DailyQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted usage
    pub fn restore(usage: BTreeMap<String, DailyUsage>) -> Self {
        Self {
            usage: usage.into_iter().collect(),
        }
    }

    /// Consume one unit; `Ok(remaining)` or `Err(used)` when the budget is spent
    pub fn try_consume(&self, strategy: &str, limit: u32, day: NaiveDate) -> Result<u32, u32> {
        let mut entry = self
            .usage
            .entry(strategy.to_string())
            .or_insert(DailyUsage { day, used: 0 });

        if entry.day != day {
            *entry = DailyUsage { day, used: 0 };
        }
        if entry.used >= limit {
            return Err(entry.used);
        }
        entry.used += 1;
        Ok(limit - entry.used)
    }

    pub fn used(&self, strategy: &str, day: NaiveDate) -> u32 {
        self.usage
            .get(strategy)
            .filter(|u| u.day == day)
            .map(|u| u.used)
            .unwrap_or(0)
    }

    /// Usage still relevant on `today`; earlier days are dropped
    pub fn snapshot(&self, today: NaiveDate) -> BTreeMap<String, DailyUsage> {
        self.usage
            .iter()
            .filter(|u| u.day >= today)
            .map(|u| (u.key().clone(), *u.value()))
            .collect()
    }
}
