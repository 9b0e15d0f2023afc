//! Backtest acceptance criteria
//!
//! Decides whether a backtest result moves a pending strategy to VALIDATED
//! or VALIDATION_FAILED.

use crate::core::BacktestResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationCriteria {
    pub min_total_bets: u64,
    pub min_win_rate: f64,
    /// Profit per 100 units staked
    pub min_roi_per_100: f64,
    pub min_confidence: f64,
}

impl Default for ValidationCriteria {
    fn default() -> Self {
        Self {
            min_total_bets: 100,
            min_win_rate: 0.52,
            min_roi_per_100: 0.0,
            min_confidence: 0.6,
        }
    }
}

impl ValidationCriteria {
    /// Every unmet criterion, empty when the backtest passes
    pub fn shortfalls(&self, result: &BacktestResult) -> Vec<String> {
        let mut failures = Vec::new();
        if result.total_bets < self.min_total_bets {
            failures.push(format!(
                "total_bets {} < {}",
                result.total_bets, self.min_total_bets
            ));
        }
        if result.wins > result.total_bets {
            failures.push(format!(
                "wins {} exceed total_bets {}",
                result.wins, result.total_bets
            ));
        }
        if !(result.win_rate >= self.min_win_rate) {
            failures.push(format!(
                "win_rate {:.4} < {:.4}",
                result.win_rate, self.min_win_rate
            ));
        }
        if !(result.roi_per_100 >= self.min_roi_per_100) {
            failures.push(format!(
                "roi_per_100 {:.2} < {:.2}",
                result.roi_per_100, self.min_roi_per_100
            ));
        }
        if !(result.confidence_score >= self.min_confidence) {
            failures.push(format!(
                "confidence {:.2} < {:.2}",
                result.confidence_score, self.min_confidence
            ));
        }
        failures
    }

    pub fn passes(&self, result: &BacktestResult) -> bool {
        self.shortfalls(result).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(total_bets: u64, win_rate: f64, roi_per_100: f64, confidence: f64) -> BacktestResult {
        BacktestResult {
            strategy_name: "sharp_action".to_string(),
            total_bets,
            wins: (total_bets as f64 * win_rate) as u64,
            win_rate,
            roi_per_100,
            confidence_score: confidence,
        }
    }

    #[test]
    fn test_passing_backtest() {
        let criteria = ValidationCriteria::default();
        assert!(criteria.passes(&result(400, 0.56, 4.2, 0.8)));
    }

    #[test]
    fn test_each_shortfall_reported() {
        let criteria = ValidationCriteria::default();
        let failures = criteria.shortfalls(&result(50, 0.48, -3.0, 0.4));
        assert_eq!(failures.len(), 4);
    }

    #[test]
    fn test_nan_metrics_fail() {
        let criteria = ValidationCriteria::default();
        assert!(!criteria.passes(&result(400, f64::NAN, 4.0, 0.8)));
    }
}
