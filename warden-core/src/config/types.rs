use crate::analysis::{AnalyzerConfig, ValidationCriteria};
use crate::core::OperationalConstraints;
use crate::monitoring::{AlertManagerConfig, MetricsServerConfig};
use crate::resilience::BreakerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main gate configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Constraints given to newly registered strategies
    #[serde(default)]
    pub constraints: OperationalConstraints,
    #[serde(default)]
    pub validation: ValidationCriteria,
    #[serde(default)]
    pub alerts: AlertManagerConfig,
    #[serde(default)]
    pub metrics: MetricsServerConfig,
}

/// Registry persistence configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Primary registry file; its checksum sits next to it
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Seconds between full-snapshot backups
    #[serde(default = "default_backup_interval")]
    pub backup_interval_secs: u64,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// Monitor loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between monitor cycles
    #[serde(default = "default_monitor_interval")]
    pub interval_secs: u64,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./data/registry.json")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("./data/backups")
}

fn default_backup_interval() -> u64 {
    900
}

fn default_retention_days() -> u32 {
    30
}

fn default_monitor_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            backup_dir: default_backup_dir(),
            backup_interval_secs: default_backup_interval(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_monitor_interval(),
        }
    }
}

impl GateConfig {
    /// Defaults with registry and backups rooted in `dir`
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            registry: RegistryConfig {
                path: dir.join("registry.json"),
                backup_dir: dir.join("backups"),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
