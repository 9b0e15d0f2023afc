//! Gate configuration
//!
//! TOML file with one section per component. Every field has a default, so
//! an empty file is a valid configuration.

pub mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

impl GateConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in {:?}", config_path))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: GateConfig =
            toml::from_str(contents).context("Failed to deserialize configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let analyzer = &self.analyzer;
        if analyzer.window_size == 0 {
            anyhow::bail!("analyzer.window_size must be positive");
        }
        if analyzer.min_sample_size == 0 {
            anyhow::bail!("analyzer.min_sample_size must be positive");
        }
        if analyzer.min_sample_size > analyzer.window_size {
            anyhow::bail!(
                "analyzer.min_sample_size ({}) cannot exceed window_size ({})",
                analyzer.min_sample_size,
                analyzer.window_size
            );
        }
        if !(analyzer.minor_threshold > 0.0
            && analyzer.minor_threshold < analyzer.major_threshold
            && analyzer.major_threshold < analyzer.critical_threshold
            && analyzer.critical_threshold <= 1.0)
        {
            anyhow::bail!(
                "degradation thresholds must satisfy 0 < minor < major < critical <= 1 (got {}/{}/{})",
                analyzer.minor_threshold,
                analyzer.major_threshold,
                analyzer.critical_threshold
            );
        }
        if analyzer.loss_streak_threshold == 0 {
            anyhow::bail!("analyzer.loss_streak_threshold must be positive");
        }
        if !(analyzer.roi_floor < 0.0 && analyzer.roi_floor >= -1.0) {
            anyhow::bail!(
                "analyzer.roi_floor must be in [-1, 0), got {}",
                analyzer.roi_floor
            );
        }

        if self.breaker.timeout_seconds == 0 {
            anyhow::bail!("breaker.timeout_seconds must be positive");
        }
        if self.breaker.probation_window_seconds == 0 {
            anyhow::bail!("breaker.probation_window_seconds must be positive");
        }
        if self.breaker.recovery_success_threshold == 0 {
            anyhow::bail!("breaker.recovery_success_threshold must be positive");
        }

        if self.monitor.interval_secs == 0 {
            anyhow::bail!("monitor.interval_secs must be positive");
        }
        if self.registry.backup_interval_secs == 0 {
            anyhow::bail!("registry.backup_interval_secs must be positive");
        }
        if self.registry.retention_days == 0 {
            anyhow::bail!("registry.retention_days must be positive");
        }
        if self.registry.path.parent() == Some(self.registry.backup_dir.as_path())
            || self.registry.path == self.registry.backup_dir
        {
            anyhow::bail!("registry.backup_dir must be distinct from the registry file's directory");
        }

        if self.constraints.max_daily_recommendations == 0 {
            anyhow::bail!("constraints.max_daily_recommendations must be positive");
        }
        if !(self.constraints.max_bet_size_multiplier > 0.0) {
            anyhow::bail!("constraints.max_bet_size_multiplier must be positive");
        }

        let criteria = &self.validation;
        if !(0.0..=1.0).contains(&criteria.min_win_rate)
            || !(0.0..=1.0).contains(&criteria.min_confidence)
        {
            anyhow::bail!("validation win rate and confidence minimums must be within [0, 1]");
        }

        Ok(())
    }
}
