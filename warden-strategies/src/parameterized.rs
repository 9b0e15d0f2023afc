//! Strategies defined by a model family plus named parameters

use crate::canonical::CanonicalWriter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warden_core::core::FingerprintError;
use warden_core::fingerprint::StrategyDefinition;

/// One parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn tag(&self) -> u8 {
        match self {
            ParamValue::Bool(_) => 0x01,
            ParamValue::Int(_) => 0x02,
            ParamValue::Float(_) => 0x03,
            ParamValue::Text(_) => 0x04,
        }
    }

    fn encode(&self, w: &mut CanonicalWriter) {
        w.u8(self.tag());
        match self {
            ParamValue::Bool(v) => w.bool(*v),
            ParamValue::Int(v) => w.i64(*v),
            ParamValue::Float(v) => w.f64(*v),
            ParamValue::Text(v) => w.string(v),
        };
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// A strategy whose behavior is fully determined by `family` and `params`
///
/// Parameters are encoded in key order, so the fingerprint does not depend
/// on how a config file happened to list them. Changing any value, the
/// family, or the family's `revision` changes the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterizedStrategy {
    pub name: String,
    pub family: String,
    /// Bumped when the family's code changes behavior for the same parameters
    #[serde(default)]
    pub revision: u32,
    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl ParameterizedStrategy {
    pub fn new(name: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            family: family.into(),
            revision: 0,
            params: BTreeMap::new(),
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl StrategyDefinition for ParameterizedStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn canonical_bytes(&self) -> Result<Vec<u8>, FingerprintError> {
        let mut w = CanonicalWriter::new();
        w.string(&self.family).u32(self.revision);
        w.u32(self.params.len() as u32);
        for (key, value) in &self.params {
            w.string(key);
            value.encode(&mut w);
        }
        Ok(w.finish())
    }
}
