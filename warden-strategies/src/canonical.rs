//! Canonical binary encoding for strategy fingerprints
//!
//! Text formats are unsafe to hash: floats print differently across
//! versions, maps reorder, optional fields come and go. Everything that
//! feeds a fingerprint is encoded here instead.
//!
//! ## Encoding rules
//! - First byte: [`ENCODING_VERSION`]
//! - Fields in a fixed order chosen by the implementor
//! - Integers and floats as little-endian fixed-width bytes
//! - Floats normalized: `-0.0` encodes as `0.0`, every NaN as one quiet NaN
//! - Strings: u32 LE length + UTF-8 bytes
//! - `Option<T>`: 0x00 = None, 0x01 + value = Some(value)

use sha2::{Digest, Sha256};

/// Bump when any rule above changes; doing so re-fingerprints every strategy
pub const ENCODING_VERSION: u8 = 0x01;

const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// Append-only canonical byte buffer
#[derive(Debug, Clone)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl Default for CanonicalWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CanonicalWriter {
    /// Start a buffer with the version byte already written
    pub fn new() -> Self {
        Self {
            buf: vec![ENCODING_VERSION],
        }
    }

    #[inline]
    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    #[inline]
    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    #[inline]
    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    #[inline]
    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    #[inline]
    pub fn f64(&mut self, value: f64) -> &mut Self {
        let bits = if value.is_nan() {
            CANONICAL_NAN
        } else if value == 0.0 {
            0
        } else {
            value.to_bits()
        };
        self.buf.extend_from_slice(&bits.to_le_bytes());
        self
    }

    #[inline]
    pub fn string(&mut self, value: &str) -> &mut Self {
        self.u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Raw fixed-width bytes, e.g. a digest
    #[inline]
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn option<T>(&mut self, value: Option<&T>, encode: impl FnOnce(&mut Self, &T)) -> &mut Self {
        match value {
            None => {
                self.u8(0x00);
            }
            Some(v) => {
                self.u8(0x01);
                encode(self, v);
            }
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// SHA-256 of canonical bytes, hex encoded
pub fn canonical_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_byte_first() {
        let bytes = CanonicalWriter::new().finish();
        assert_eq!(bytes, vec![ENCODING_VERSION]);
    }

    #[test]
    fn test_deterministic() {
        let encode = || {
            let mut w = CanonicalWriter::new();
            w.string("sharp_action").i64(-8).f64(0.56).bool(true);
            w.finish()
        };
        assert_eq!(encode(), encode());
        assert_eq!(canonical_hash(&encode()), canonical_hash(&encode()));
    }

    #[test]
    fn test_float_normalization() {
        let mut a = CanonicalWriter::new();
        a.f64(0.0).f64(f64::NAN);
        let mut b = CanonicalWriter::new();
        b.f64(-0.0).f64(-f64::NAN);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn test_string_length_prefix_prevents_ambiguity() {
        let mut a = CanonicalWriter::new();
        a.string("ab").string("c");
        let mut b = CanonicalWriter::new();
        b.string("a").string("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn test_option_marker() {
        let mut none = CanonicalWriter::new();
        none.option(None::<&i64>, |w, v| {
            w.i64(*v);
        });
        let mut zero = CanonicalWriter::new();
        zero.option(Some(&0i64), |w, v| {
            w.i64(*v);
        });
        assert_ne!(none.finish(), zero.finish());
    }
}
