//! Test helper utilities for building strategies, outcomes and alert sinks

use crate::core::{FingerprintError, OutcomeSample};
use crate::fingerprint::StrategyDefinition;
use crate::monitoring::{Alert, AlertSink};
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};

/// Strategy definition backed by an in-memory source string
pub struct StaticDefinition {
    name: String,
    source: RwLock<String>,
    unavailable: RwLock<bool>,
}

impl StaticDefinition {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: RwLock::new(source.into()),
            unavailable: RwLock::new(false),
        }
    }

    /// Simulate a code change
    pub fn set_source(&self, source: impl Into<String>) {
        *self.source.write() = source.into();
    }

    /// Simulate a definition that can no longer be introspected
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }
}

impl StrategyDefinition for StaticDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, FingerprintError> {
        if *self.unavailable.read() {
            return Err(FingerprintError::unavailable(
                &self.name,
                "source not readable",
            ));
        }
        Ok(self.source.read().as_bytes().to_vec())
    }
}

/// Build samples from a pattern such as `"WLLWL"`; wins earn `win_roi`, losses `loss_roi`
pub fn outcomes_from_pattern(
    pattern: &str,
    win_roi: f64,
    loss_roi: f64,
    start: DateTime<Utc>,
) -> Vec<OutcomeSample> {
    pattern
        .chars()
        .filter(|c| !c.is_whitespace())
        .enumerate()
        .map(|(i, c)| {
            let won = matches!(c, 'W' | 'w');
            let roi = if won { win_roi } else { loss_roi };
            OutcomeSample::new(won, roi, start + Duration::minutes(i as i64))
        })
        .collect()
}

/// `count` samples repeating `pattern`
pub fn outcome_series(
    pattern: &str,
    count: usize,
    win_roi: f64,
    loss_roi: f64,
    start: DateTime<Utc>,
) -> Vec<OutcomeSample> {
    let repeated: String = pattern.chars().cycle().take(count).collect();
    outcomes_from_pattern(&repeated, win_roi, loss_roi, start)
}

/// Alert sink that records every delivered alert
#[derive(Default)]
pub struct MemorySink {
    received: Mutex<Vec<Alert>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<Alert> {
        self.received.lock().clone()
    }
}

impl AlertSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        self.received.lock().push(alert.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_builder() {
        let samples = outcomes_from_pattern("WL W", 0.9, -1.0, Utc::now());
        assert_eq!(samples.len(), 3);
        assert!(samples[0].outcome);
        assert!(!samples[1].outcome);
        assert_eq!(samples[1].roi, -1.0);
        assert!(samples[2].timestamp > samples[1].timestamp);
    }

    #[test]
    fn test_series_repeats_pattern() {
        let samples = outcome_series("WLLWL", 50, 0.5, -0.2, Utc::now());
        assert_eq!(samples.len(), 50);
        assert_eq!(samples.iter().filter(|s| s.outcome).count(), 20);
    }
}
