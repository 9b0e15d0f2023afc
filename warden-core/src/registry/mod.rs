//! Strategy registry
//!
//! - `version` / `record`: the per-strategy aggregate
//! - `snapshot`: versioned on-disk format with v1 migration
//! - `store`: checksummed atomic primary file
//! - `backup`: timestamped snapshots with time-based retention
//! - `integrity`: startup consistency check

pub mod backup;
pub mod integrity;
pub mod record;
pub mod snapshot;
pub mod store;
pub mod version;

pub use backup::{BackupEntry, BackupManager};
pub use integrity::IntegrityViolation;
pub use record::{HistoryEntry, PerformanceAlert, RecordTemplate, ValidationRecord};
pub use snapshot::{FailoverState, RegistrySnapshot, CURRENT_FORMAT_VERSION};
pub use store::RegistryStore;
pub use version::StrategyVersion;
