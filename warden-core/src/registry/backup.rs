//! Periodic full-snapshot backups
//!
//! Backups live in their own directory as
//! `registry_YYYYMMDDTHHMMSSmmmZ.json` with a paired `.sha256` file.
//! Retention is time-based and reads the timestamp from the file name, so
//! it does not depend on file system mtimes surviving a copy.

use super::record::RecordTemplate;
use super::snapshot::RegistrySnapshot;
use super::store::{checksum_path, read_verified, write_checksummed};
use crate::core::RegistryError;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PREFIX: &str = "registry_";
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    retention: Duration,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            dir: dir.into(),
            retention: Duration::days(retention_days as i64),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, taken_at: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("{}{}.json", PREFIX, taken_at.format(TIMESTAMP_FORMAT)))
    }

    /// Write a full snapshot, then prune expired backups
    pub fn backup(
        &self,
        snapshot: &RegistrySnapshot,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, RegistryError> {
        let path = self.path_for(now);
        write_checksummed(&path, &snapshot.encode()?)?;
        info!("Registry backup written to {:?}", path);

        match self.prune(now) {
            Ok(0) => {}
            Ok(n) => info!("Pruned {} expired registry backups", n),
            Err(e) => warn!("Backup retention pruning failed: {}", e),
        }
        Ok(path)
    }

    /// Backups newest first
    pub fn list(&self) -> Result<Vec<BackupEntry>, RegistryError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegistryError::persistence(&self.dir, e)),
        };

        let mut entries: Vec<BackupEntry> = read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let taken_at = parse_backup_name(&path)?;
                Some(BackupEntry { path, taken_at })
            })
            .collect();
        entries.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        Ok(entries)
    }

    /// Remove backups older than the retention period; returns how many
    pub fn prune(&self, now: DateTime<Utc>) -> Result<usize, RegistryError> {
        let cutoff = now - self.retention;
        let mut removed = 0;
        for entry in self.list()? {
            if entry.taken_at >= cutoff {
                continue;
            }
            fs::remove_file(&entry.path).map_err(|e| RegistryError::persistence(&entry.path, e))?;
            let sum = checksum_path(&entry.path);
            if sum.exists() {
                fs::remove_file(&sum).map_err(|e| RegistryError::persistence(&sum, e))?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Newest backup that verifies and decodes
    pub fn latest_valid(
        &self,
        template: &RecordTemplate,
        now: DateTime<Utc>,
    ) -> Result<Option<(BackupEntry, RegistrySnapshot)>, RegistryError> {
        for entry in self.list()? {
            let decoded = read_verified(&entry.path)
                .and_then(|bytes| RegistrySnapshot::decode(&bytes, &entry.path, template, now));
            match decoded {
                Ok(snapshot) => return Ok(Some((entry, snapshot))),
                Err(e) => warn!("Skipping unusable backup {:?}: {}", entry.path, e),
            }
        }
        Ok(None)
    }
}

fn parse_backup_name(path: &Path) -> Option<DateTime<Utc>> {
    if path.extension()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let ts = stem.strip_prefix(PREFIX)?;
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
