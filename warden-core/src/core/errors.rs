//! Error taxonomy for the validation gate
//!
//! A denied gate decision is not an error. These types cover the cases where
//! an operation could not be carried out at all.

use super::types::ValidationStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Bad administrative or lifecycle request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid transition for '{strategy}': {from} -> {to}")]
    InvalidTransition {
        strategy: String,
        from: ValidationStatus,
        to: ValidationStatus,
    },

    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("emergency control active, '{strategy}' cannot be moved to {to}")]
    EmergencyActive {
        strategy: String,
        to: ValidationStatus,
    },

    #[error("registry is in failover mode, '{strategy}' cannot be moved to {to}")]
    RegistryUnhealthy {
        strategy: String,
        to: ValidationStatus,
    },

    #[error("actor must be named for '{0}'")]
    MissingActor(String),
}

/// The strategy definition could not be turned into a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("fingerprint unavailable for '{strategy}': {reason}")]
    Unavailable { strategy: String, reason: String },
}

impl FingerprintError {
    pub fn unavailable(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}

/// Persistence and integrity failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry corruption in {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("persistence failure for {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode registry snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Errors after which the registry can no longer be trusted
    pub fn is_trust_breaking(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::Persistence { .. })
    }
}

/// Top-level error returned by the gate service
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("background tasks require a running tokio runtime")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let err = ValidationError::InvalidTransition {
            strategy: "sharp_action".to_string(),
            from: ValidationStatus::Unvalidated,
            to: ValidationStatus::Approved,
        };
        let msg = err.to_string();
        assert!(msg.contains("sharp_action"));
        assert!(msg.contains("UNVALIDATED -> APPROVED"));
    }

    #[test]
    fn test_trust_breaking_errors() {
        let corruption = RegistryError::corruption("/tmp/registry.json", "checksum mismatch");
        assert!(corruption.is_trust_breaking());

        let io = RegistryError::persistence(
            "/tmp/registry.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(io.is_trust_breaking());
    }

    #[test]
    fn test_gate_error_from_validation() {
        let err: GateError = ValidationError::UnknownStrategy("ghost".to_string()).into();
        assert!(matches!(err, GateError::Validation(_)));
        assert_eq!(err.to_string(), "unknown strategy 'ghost'");
    }
}
