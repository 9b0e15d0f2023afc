//! Checksummed, atomically written registry files
//!
//! Every data file `name.json` is paired with `name.sha256` in `sha256sum`
//! format. Both are written to a temporary file in the same directory,
//! synced and renamed into place, so a reader never observes a torn file.
//! A crash between the two renames leaves a checksum mismatch, which the
//! loader reports as corruption and the gate heals from a backup.
//!
//! Legacy v1 registries predate checksums. A primary without a checksum file
//! is still loaded when it has no `format_version`; the gate then rewrites
//! it in the current format with its checksum.

use super::record::RecordTemplate;
use super::snapshot::RegistrySnapshot;
use crate::core::RegistryError;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Path of the checksum file paired with `path`
pub fn checksum_path(path: &Path) -> PathBuf {
    path.with_extension("sha256")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `bytes` to `path` through a synced temporary file and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| RegistryError::persistence(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "registry".to_string());
    let tmp = dir.join(format!(".{}.tmp", file_name));

    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(RegistryError::persistence(path, e));
    }
    Ok(())
}

/// Write a data file and its checksum
pub fn write_checksummed(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let digest = sha256_hex(bytes);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    write_atomic(path, bytes)?;
    write_atomic(
        &checksum_path(path),
        format!("{}  {}\n", digest, file_name).as_bytes(),
    )?;
    debug!("Wrote {} bytes to {:?} (sha256 {})", bytes.len(), path, &digest[..12]);
    Ok(())
}

/// Read a data file, verifying it against its checksum
pub fn read_verified(path: &Path) -> Result<Vec<u8>, RegistryError> {
    let bytes = fs::read(path).map_err(|e| RegistryError::persistence(path, e))?;

    let sum_path = checksum_path(path);
    let recorded = match fs::read_to_string(&sum_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RegistryError::corruption(path, "checksum file missing"));
        }
        Err(e) => return Err(RegistryError::persistence(&sum_path, e)),
    };

    let expected = recorded
        .split_whitespace()
        .next()
        .ok_or_else(|| RegistryError::corruption(path, "checksum file empty"))?;
    let actual = sha256_hex(&bytes);

    if !expected.eq_ignore_ascii_case(&actual) {
        warn!("Checksum mismatch for {:?}: recorded {}, actual {}", path, expected, actual);
        return Err(RegistryError::corruption(
            path,
            format!("checksum mismatch (recorded {}, actual {})", expected, actual),
        ));
    }
    Ok(bytes)
}

/// Primary registry file
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        write_checksummed(&self.path, &snapshot.encode()?)
    }

    /// `Ok(None)` when no registry has been written yet
    pub fn load(
        &self,
        template: &RecordTemplate,
        now: DateTime<Utc>,
    ) -> Result<Option<RegistrySnapshot>, RegistryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = match read_verified(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if !checksum_path(&self.path).exists() => {
                let bytes =
                    fs::read(&self.path).map_err(|io| RegistryError::persistence(&self.path, io))?;
                if !RegistrySnapshot::is_unversioned(&bytes) {
                    return Err(e);
                }
                warn!(
                    "Legacy registry {:?} has no checksum file, loading it unverified for migration",
                    self.path
                );
                bytes
            }
            Err(e) => return Err(e),
        };
        RegistrySnapshot::decode(&bytes, &self.path, template, now).map(Some)
    }

    /// Move an unusable primary and its checksum aside so they survive the next save
    pub fn quarantine_corrupt(&self, now: DateTime<Utc>) -> Option<PathBuf> {
        if !self.path.exists() {
            return None;
        }
        let target = self
            .path
            .with_extension(format!("corrupt-{}.json", now.format("%Y%m%dT%H%M%SZ")));
        match fs::rename(&self.path, &target) {
            Ok(()) => {
                let _ = fs::rename(checksum_path(&self.path), target.with_extension("sha256"));
                Some(target)
            }
            Err(e) => {
                warn!("Could not move unusable registry {:?} aside: {}", self.path, e);
                None
            }
        }
    }
}
