//! Daemon configuration file
//!
//! The gate sections (`[registry]`, `[monitor]`, `[analyzer]`, ...) sit at
//! the top level next to `[feed]` and the `[[strategies]]` list.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use warden_core::GateConfig;
use warden_strategies::{validate_all, StrategyDescriptor};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(flatten)]
    pub gate: GateConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub strategies: Vec<StrategyDescriptor>,
}

/// Where settled live outcomes come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Append-only JSONL file of outcomes; without it outcomes must be pushed
    #[serde(default)]
    pub outcomes_path: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_path = path.as_ref();
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {:?}", config_path))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid configuration in {:?}", config_path))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: DaemonConfig =
            toml::from_str(contents).context("Failed to deserialize configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.gate.validate()?;
        validate_all(&self.strategies)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[registry]
path = "/var/lib/warden/registry.json"
backup_dir = "/var/lib/warden/backups"

[monitor]
interval_secs = 120

[analyzer]
min_sample_size = 20

[feed]
outcomes_path = "/var/lib/warden/outcomes.jsonl"

[[strategies]]
kind = "parameterized"
name = "sharp_action"
family = "line_movement"
params = { min_edge = 0.03, max_books = 6 }

[[strategies]]
kind = "version"
name = "steam_move"
version = "2.3.1"
"#;

    #[test]
    fn test_parse_sample() {
        let cfg = DaemonConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.gate.monitor.interval_secs, 120);
        assert_eq!(cfg.gate.analyzer.min_sample_size, 20);
        assert_eq!(cfg.gate.analyzer.window_size, 50);
        assert_eq!(
            cfg.feed.outcomes_path,
            Some(PathBuf::from("/var/lib/warden/outcomes.jsonl"))
        );
        assert_eq!(cfg.strategies.len(), 2);
        assert_eq!(cfg.strategies[1].name(), "steam_move");
    }

    #[test]
    fn test_empty_file_is_default() {
        let cfg = DaemonConfig::from_toml_str("").unwrap();
        assert!(cfg.strategies.is_empty());
        assert!(cfg.feed.outcomes_path.is_none());
        assert_eq!(cfg.gate.breaker.timeout_seconds, 3600);
    }

    #[test]
    fn test_duplicate_strategies_rejected() {
        let contents = r#"
[[strategies]]
kind = "version"
name = "steam_move"
version = "1"

[[strategies]]
kind = "version"
name = "steam_move"
version = "2"
"#;
        let err = DaemonConfig::from_toml_str(contents).unwrap_err();
        assert!(format!("{:#}", err).contains("more than once"));
    }

    #[test]
    fn test_bad_gate_section_rejected() {
        let contents = "[analyzer]\nmin_sample_size = 80\n";
        assert!(DaemonConfig::from_toml_str(contents).is_err());
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/warden.toml");
        let cfg = DaemonConfig::load(path).unwrap();
        assert!(!cfg.strategies.is_empty());
    }
}
