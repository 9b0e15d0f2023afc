//! Strategy fingerprints
//!
//! A fingerprint is the SHA-256 digest of a strategy's canonical, versionable
//! representation. Strategies expose that representation through
//! [`StrategyDefinition`]; nothing here inspects loaded code.
//!
//! Digests are cached per strategy and computed when a definition is
//! attached. The cache is only refreshed by [`FingerprintComputer::recompute`],
//! so the gate check never touches the strategy source on the hot path.

use crate::core::FingerprintError;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Domain separation prefix, bumped if the digest layout changes
const FINGERPRINT_DOMAIN: &[u8] = b"warden.strategy.fingerprint.v1\0";

/// 256-bit strategy digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, String> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid fingerprint hex: {}", e))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("fingerprint must be 32 bytes, got {}", v.len()))?;
        Ok(Self(array))
    }

    /// First 8 hex characters, used in version ids and log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Digest a strategy's canonical bytes
    pub fn compute(strategy_name: &str, canonical: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update((strategy_name.len() as u32).to_le_bytes());
        hasher.update(strategy_name.as_bytes());
        hasher.update((canonical.len() as u64).to_le_bytes());
        hasher.update(canonical);
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A strategy that can describe itself canonically
///
/// Implementations must return identical bytes for semantically identical
/// definitions and different bytes for any semantic change. Failing to
/// produce them is reported as [`FingerprintError::Unavailable`], which
/// callers treat as "cannot verify".
pub trait StrategyDefinition: Send + Sync {
    fn name(&self) -> &str;

    fn canonical_bytes(&self) -> Result<Vec<u8>, FingerprintError>;
}

/// Fingerprint cache keyed by strategy name
#[derive(Default)]
pub struct FingerprintComputer {
    definitions: DashMap<String, Arc<dyn StrategyDefinition>>,
    cache: DashMap<String, Fingerprint>,
}

impl FingerprintComputer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or replace) the definition for a strategy and cache its digest
    ///
    /// A definition that cannot be fingerprinted yet is still attached;
    /// lookups retry until it can.
    pub fn attach(&self, definition: Arc<dyn StrategyDefinition>) {
        let name = definition.name().to_string();
        debug!("Attaching strategy definition '{}'", name);
        self.definitions.insert(name.clone(), definition);
        if let Err(e) = self.recompute(&name) {
            debug!("No cached fingerprint for '{}' yet: {}", name, e);
        }
    }

    /// Cached digest, computed on first use
    pub fn current(&self, strategy_name: &str) -> Result<Fingerprint, FingerprintError> {
        if let Some(cached) = self.cache.get(strategy_name) {
            return Ok(*cached);
        }
        self.compute_and_cache(strategy_name)
    }

    /// Fresh digest from the definition, replacing the cached one
    pub fn recompute(&self, strategy_name: &str) -> Result<Fingerprint, FingerprintError> {
        self.cache.remove(strategy_name);
        self.compute_and_cache(strategy_name)
    }

    fn compute_and_cache(&self, strategy_name: &str) -> Result<Fingerprint, FingerprintError> {
        let definition = self
            .definitions
            .get(strategy_name)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| {
                FingerprintError::unavailable(strategy_name, "no strategy definition attached")
            })?;

        let bytes = definition.canonical_bytes().map_err(|e| {
            warn!("Cannot fingerprint '{}': {}", strategy_name, e);
            e
        })?;
        if bytes.is_empty() {
            return Err(FingerprintError::unavailable(
                strategy_name,
                "definition produced an empty canonical representation",
            ));
        }

        let fingerprint = Fingerprint::compute(strategy_name, &bytes);
        self.cache.insert(strategy_name.to_string(), fingerprint);
        Ok(fingerprint)
    }
}
