//! Config-file descriptions of strategies
//!
//! ```toml
//! [[strategies]]
//! kind = "parameterized"
//! name = "sharp_action"
//! family = "line_movement"
//! params = { min_edge = 0.03, max_books = 6 }
//!
//! [[strategies]]
//! kind = "artifact"
//! name = "totals_model"
//! path = "/srv/models/totals.onnx"
//!
//! [[strategies]]
//! kind = "version"
//! name = "steam_move"
//! version = "2.3.1"
//! ```

use crate::{ArtifactStrategy, ParameterizedStrategy, VersionTag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use warden_core::fingerprint::StrategyDefinition;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("strategy name must not be empty")]
    EmptyName,

    #[error("strategy '{0}' is declared more than once")]
    Duplicate(String),

    #[error("strategy '{0}' has an empty version tag")]
    EmptyVersion(String),

    #[error("strategy '{0}' has an empty artifact path")]
    EmptyPath(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyDescriptor {
    Parameterized(ParameterizedStrategy),
    Artifact(ArtifactStrategy),
    Version(VersionTag),
}

impl StrategyDescriptor {
    pub fn name(&self) -> &str {
        match self {
            StrategyDescriptor::Parameterized(s) => &s.name,
            StrategyDescriptor::Artifact(s) => &s.name,
            StrategyDescriptor::Version(s) => &s.name,
        }
    }

    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name().trim().is_empty() {
            return Err(DescriptorError::EmptyName);
        }
        match self {
            StrategyDescriptor::Version(s) if s.version.trim().is_empty() => {
                Err(DescriptorError::EmptyVersion(s.name.clone()))
            }
            StrategyDescriptor::Artifact(s) if s.path.as_os_str().is_empty() => {
                Err(DescriptorError::EmptyPath(s.name.clone()))
            }
            _ => Ok(()),
        }
    }

    pub fn into_definition(self) -> Arc<dyn StrategyDefinition> {
        match self {
            StrategyDescriptor::Parameterized(s) => Arc::new(s),
            StrategyDescriptor::Artifact(s) => Arc::new(s),
            StrategyDescriptor::Version(s) => Arc::new(s),
        }
    }
}

/// Validate every descriptor and reject duplicate names
pub fn validate_all(descriptors: &[StrategyDescriptor]) -> Result<(), DescriptorError> {
    let mut seen = BTreeSet::new();
    for descriptor in descriptors {
        descriptor.validate()?;
        if !seen.insert(descriptor.name()) {
            return Err(DescriptorError::Duplicate(descriptor.name().to_string()));
        }
    }
    Ok(())
}
