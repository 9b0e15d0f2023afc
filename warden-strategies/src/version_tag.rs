//! Strategies identified by an explicit version string

use crate::canonical::CanonicalWriter;
use serde::{Deserialize, Serialize};
use warden_core::core::FingerprintError;
use warden_core::fingerprint::StrategyDefinition;

/// The deployer promises that `version` changes whenever behavior does
///
/// Weakest of the three representations: the gate can only see what the
/// tag says. Prefer [`crate::ParameterizedStrategy`] or
/// [`crate::ArtifactStrategy`] when the definition is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTag {
    pub name: String,
    pub version: String,
}

impl VersionTag {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl StrategyDefinition for VersionTag {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, FingerprintError> {
        let version = self.version.trim();
        if version.is_empty() {
            return Err(FingerprintError::unavailable(&self.name, "empty version tag"));
        }
        let mut w = CanonicalWriter::new();
        w.string("version").string(version);
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrounding_whitespace_ignored() {
        assert_eq!(
            VersionTag::new("s", "1.4.2").canonical_bytes().unwrap(),
            VersionTag::new("s", " 1.4.2\n").canonical_bytes().unwrap()
        );
    }

    #[test]
    fn test_empty_tag_is_unavailable() {
        assert!(VersionTag::new("s", "  ").canonical_bytes().is_err());
    }
}
