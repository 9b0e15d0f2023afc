//! Rolling-window degradation detector
//!
//! Compares live outcomes against the baseline a version was validated with.
//! Two independent signals are produced:
//!
//! - a degradation level, from the relative decline of win rate and mean roi
//! - a circuit-breaker trigger, from the current loss streak and the roi floor
//!
//! The trigger can co-occur with any degradation level and takes precedence
//! in the action the monitor derives from the result.

use crate::core::{OutcomeSample, OutcomeWindow, PerformanceMetrics};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tolerance applied when comparing a decline against a threshold
const THRESHOLD_EPSILON: f64 = 1e-9;

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Number of most recent samples evaluated
    pub window_size: usize,
    /// Below this many samples the analysis is skipped
    pub min_sample_size: usize,
    /// Relative decline thresholds (0.10 = 10%)
    pub minor_threshold: f64,
    pub major_threshold: f64,
    pub critical_threshold: f64,
    /// Consecutive losses that trip the breaker
    pub loss_streak_threshold: u32,
    /// Mean roi at or below which the breaker trips (-0.15 = -15%)
    pub roi_floor: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            min_sample_size: 10,
            minor_threshold: 0.10,
            major_threshold: 0.20,
            critical_threshold: 0.30,
            loss_streak_threshold: 5,
            roi_floor: -0.15,
        }
    }
}

/// Degradation classification, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DegradationLevel {
    None,
    Minor,
    Major,
    Critical,
}

impl DegradationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the breaker should trip
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakerTrigger {
    LossStreak { streak: u32, threshold: u32 },
    RoiFloor { roi: f64, floor: f64 },
}

impl fmt::Display for BreakerTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerTrigger::LossStreak { streak, threshold } => {
                write!(f, "{} consecutive losses (threshold {})", streak, threshold)
            }
            BreakerTrigger::RoiFloor { roi, floor } => {
                write!(
                    f,
                    "mean roi {:.2}% at or below floor {:.2}%",
                    roi * 100.0,
                    floor * 100.0
                )
            }
        }
    }
}

/// Statistics computed over the live window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub samples: usize,
    pub win_rate: f64,
    pub mean_roi: f64,
    pub loss_streak: u32,
}

/// Full analysis result, kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAssessment {
    pub level: DegradationLevel,
    pub circuit_breaker_trigger: bool,
    pub trigger: Option<BreakerTrigger>,
    pub live: LiveMetrics,
    pub baseline: Option<PerformanceMetrics>,
    /// Relative decline of win rate; `None` when the baseline is missing or not positive
    pub win_rate_decline: Option<f64>,
    pub roi_decline: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    InsufficientData { samples: usize, required: usize },
    Assessed(PerformanceAssessment),
}

impl AnalysisOutcome {
    pub fn assessment(&self) -> Option<&PerformanceAssessment> {
        match self {
            AnalysisOutcome::Assessed(a) => Some(a),
            AnalysisOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Stateless analyzer; all state lives in the record's outcome window
#[derive(Debug, Clone, Default)]
pub struct PerformanceAnalyzer {
    config: AnalyzerConfig,
}

impl PerformanceAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        window: &OutcomeWindow,
        baseline: Option<&PerformanceMetrics>,
    ) -> AnalysisOutcome {
        let recent: Vec<&OutcomeSample> = {
            let skip = window.len().saturating_sub(self.config.window_size);
            window.iter().skip(skip).collect()
        };

        if recent.len() < self.config.min_sample_size || recent.is_empty() {
            return AnalysisOutcome::InsufficientData {
                samples: recent.len(),
                required: self.config.min_sample_size.max(1),
            };
        }

        let n = recent.len() as f64;
        let wins = recent.iter().filter(|s| s.outcome).count() as f64;
        let win_rate = wins / n;
        let mean_roi = recent.iter().map(|s| s.roi).sum::<f64>() / n;
        let loss_streak = recent.iter().rev().take_while(|s| !s.outcome).count() as u32;

        let win_rate_decline = baseline.and_then(|b| relative_decline(b.win_rate, win_rate));
        let roi_decline = baseline.and_then(|b| relative_decline(b.roi, mean_roi));

        let level = [win_rate_decline, roi_decline]
            .into_iter()
            .flatten()
            .map(|decline| self.classify(decline))
            .max()
            .unwrap_or(DegradationLevel::None);

        let trigger = if loss_streak >= self.config.loss_streak_threshold {
            Some(BreakerTrigger::LossStreak {
                streak: loss_streak,
                threshold: self.config.loss_streak_threshold,
            })
        } else if mean_roi <= self.config.roi_floor {
            Some(BreakerTrigger::RoiFloor {
                roi: mean_roi,
                floor: self.config.roi_floor,
            })
        } else {
            None
        };

        AnalysisOutcome::Assessed(PerformanceAssessment {
            level,
            circuit_breaker_trigger: trigger.is_some(),
            trigger,
            live: LiveMetrics {
                samples: recent.len(),
                win_rate,
                mean_roi,
                loss_streak,
            },
            baseline: baseline.cloned(),
            win_rate_decline,
            roi_decline,
        })
    }

    fn classify(&self, decline: f64) -> DegradationLevel {
        let exceeds = |threshold: f64| decline + THRESHOLD_EPSILON >= threshold;
        if exceeds(self.config.critical_threshold) {
            DegradationLevel::Critical
        } else if exceeds(self.config.major_threshold) {
            DegradationLevel::Major
        } else if exceeds(self.config.minor_threshold) {
            DegradationLevel::Minor
        } else {
            DegradationLevel::None
        }
    }
}

/// `(baseline - current) / baseline`, skipped when the baseline is not positive
fn relative_decline(baseline: f64, current: f64) -> Option<f64> {
    if baseline <= 0.0 || !baseline.is_finite() || !current.is_finite() {
        return None;
    }
    Some((baseline - current) / baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{outcome_series, outcomes_from_pattern};
    use approx::assert_relative_eq;
    use chrono::Utc;
    use proptest::prelude::*;

    fn window_of(samples: Vec<OutcomeSample>) -> OutcomeWindow {
        let mut window = OutcomeWindow::new(50);
        for s in samples {
            window.push(s);
        }
        window
    }

    fn baseline(win_rate: f64, roi: f64) -> PerformanceMetrics {
        PerformanceMetrics {
            win_rate,
            roi,
            sample_size: 500,
            confidence_score: 0.9,
        }
    }

    #[test]
    fn test_insufficient_data_is_skipped() {
        let analyzer = PerformanceAnalyzer::default();
        let window = window_of(outcomes_from_pattern("LLLLLLLLL", 0.9, -1.0, Utc::now()));

        let outcome = analyzer.analyze(&window, Some(&baseline(0.55, 0.05)));
        assert_eq!(
            outcome,
            AnalysisOutcome::InsufficientData {
                samples: 9,
                required: 10
            }
        );
    }

    #[test]
    fn test_sharp_action_major_not_critical() {
        // 20 wins / 30 losses, never more than two losses in a row
        let analyzer = PerformanceAnalyzer::default();
        let window = window_of(outcome_series("WLLWL", 50, 0.5, -0.2, Utc::now()));

        let outcome = analyzer.analyze(&window, Some(&baseline(0.56, 0.0)));
        let assessment = outcome.assessment().unwrap();

        assert_relative_eq!(assessment.live.win_rate, 0.40, epsilon = 1e-12);
        assert_relative_eq!(
            assessment.win_rate_decline.unwrap(),
            0.16 / 0.56,
            epsilon = 1e-12
        );
        assert_eq!(assessment.level, DegradationLevel::Major);
        assert!(!assessment.circuit_breaker_trigger);
        // roi baseline of zero is skipped
        assert!(assessment.roi_decline.is_none());
    }

    #[test]
    fn test_exact_threshold_counts_as_exceeded() {
        let analyzer = PerformanceAnalyzer::default();
        // 4 wins in 10 against a 0.5 baseline: exactly 20%
        let window = window_of(outcomes_from_pattern("WLWLWLWLLW", 0.5, -0.2, Utc::now()));
        let outcome = analyzer.analyze(&window, Some(&baseline(0.5, 0.0)));
        assert_eq!(outcome.assessment().unwrap().level, DegradationLevel::Major);
    }

    #[test]
    fn test_roi_decline_alone_classifies() {
        let analyzer = PerformanceAnalyzer::default();
        // win rate holds at 0.5, roi collapses from 0.10 to 0.05
        let window = window_of(outcome_series("WL", 20, 0.3, -0.2, Utc::now()));
        let outcome = analyzer.analyze(&window, Some(&baseline(0.5, 0.10)));
        let assessment = outcome.assessment().unwrap();

        assert_relative_eq!(assessment.roi_decline.unwrap(), 0.5, epsilon = 1e-9);
        assert_eq!(assessment.level, DegradationLevel::Critical);
    }

    #[test]
    fn test_loss_streak_triggers_breaker() {
        let analyzer = PerformanceAnalyzer::default();
        let window = window_of(outcomes_from_pattern("WWWWWWWWLLLLL", 0.9, -0.1, Utc::now()));

        let assessment = analyzer
            .analyze(&window, Some(&baseline(0.55, 0.05)))
            .assessment()
            .cloned()
            .unwrap();

        assert!(assessment.circuit_breaker_trigger);
        assert_eq!(assessment.live.loss_streak, 5);
        assert!(matches!(
            assessment.trigger,
            Some(BreakerTrigger::LossStreak { streak: 5, .. })
        ));
    }

    #[test]
    fn test_roi_floor_triggers_breaker() {
        let analyzer = PerformanceAnalyzer::default();
        let window = window_of(outcome_series("WLL", 30, 0.5, -0.5, Utc::now()));

        let assessment = analyzer.analyze(&window, None).assessment().cloned().unwrap();

        assert!(assessment.live.mean_roi <= -0.15);
        assert!(matches!(assessment.trigger, Some(BreakerTrigger::RoiFloor { .. })));
        assert_eq!(assessment.level, DegradationLevel::None);
    }

    #[test]
    fn test_only_last_window_size_samples_count() {
        let config = AnalyzerConfig {
            window_size: 10,
            ..Default::default()
        };
        let analyzer = PerformanceAnalyzer::new(config);
        let mut samples = outcome_series("L", 40, 0.5, -0.2, Utc::now());
        samples.extend(outcome_series("W", 10, 0.5, -0.2, Utc::now()));
        let window = window_of(samples);

        let assessment = analyzer.analyze(&window, None).assessment().cloned().unwrap();
        assert_eq!(assessment.live.samples, 10);
        assert_relative_eq!(assessment.live.win_rate, 1.0);
    }

    proptest! {
        #[test]
        fn prop_level_is_monotonic_in_decline(
            baseline_rate in 0.3..0.8_f64,
            wins in 0usize..50,
        ) {
            let analyzer = PerformanceAnalyzer::default();
            let pattern: String = (0..50).map(|i| if i < wins { 'W' } else { 'L' }).collect();
            // interleave so the loss streak never matters for the level
            let window = window_of(outcomes_from_pattern(&pattern, 0.5, -0.2, Utc::now()));
            let assessment = analyzer
                .analyze(&window, Some(&baseline(baseline_rate, 0.0)))
                .assessment()
                .cloned()
                .unwrap();

            let decline = (baseline_rate - assessment.live.win_rate) / baseline_rate;
            let expected = if decline + 1e-9 >= 0.30 {
                DegradationLevel::Critical
            } else if decline + 1e-9 >= 0.20 {
                DegradationLevel::Major
            } else if decline + 1e-9 >= 0.10 {
                DegradationLevel::Minor
            } else {
                DegradationLevel::None
            };
            prop_assert_eq!(assessment.level, expected);
        }

        #[test]
        fn prop_trigger_iff_streak_or_floor(pattern in "[WL]{10,50}") {
            let analyzer = PerformanceAnalyzer::default();
            let window = window_of(outcomes_from_pattern(&pattern, 0.9, -1.0, Utc::now()));
            let assessment = analyzer.analyze(&window, None).assessment().cloned().unwrap();

            let streak = pattern.chars().rev().take_while(|c| *c == 'L').count() as u32;
            let expected = streak >= 5 || assessment.live.mean_roi <= -0.15;
            prop_assert_eq!(assessment.circuit_breaker_trigger, expected);
        }
    }
}
