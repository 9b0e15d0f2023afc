//! Strategies shipped as a file: compiled model, script, or rules file

use crate::canonical::CanonicalWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::debug;
use warden_core::core::FingerprintError;
use warden_core::fingerprint::StrategyDefinition;

/// Fingerprinted by the content of the artifact file
///
/// The file is hashed when the fingerprint is computed; the gate caches the
/// result until the fingerprint is refreshed or re-checked by the monitor.
/// An unreadable artifact makes the fingerprint unavailable, which blocks
/// the strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactStrategy {
    pub name: String,
    pub path: PathBuf,
}

impl ArtifactStrategy {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    fn digest(&self) -> Result<[u8; 32], FingerprintError> {
        let unavailable = |e: std::io::Error| {
            FingerprintError::unavailable(
                &self.name,
                format!("cannot read artifact {:?}: {}", self.path, e),
            )
        };

        let mut file = File::open(&self.path).map_err(unavailable)?;
        let mut hasher = Sha256::new();
        let mut chunk = [0u8; 64 * 1024];
        let mut total = 0usize;
        loop {
            let n = file.read(&mut chunk).map_err(unavailable)?;
            if n == 0 {
                break;
            }
            hasher.update(&chunk[..n]);
            total += n;
        }
        debug!("Hashed {} bytes of artifact {:?}", total, self.path);
        Ok(hasher.finalize().into())
    }
}

impl StrategyDefinition for ArtifactStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, FingerprintError> {
        let digest = self.digest()?;
        let mut w = CanonicalWriter::new();
        w.string("artifact").raw(&digest);
        Ok(w.finish())
    }
}
