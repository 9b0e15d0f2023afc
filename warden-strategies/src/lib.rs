//! Warden Strategies - canonical strategy definitions
//!
//! The gate never inspects running code. Each strategy is registered with a
//! definition that can describe itself as canonical bytes, and the gate
//! fingerprints those bytes.
//!
//! ## Available Definitions
//!
//! ### [`ParameterizedStrategy`]
//!
//! A model family plus named parameters. Parameters are encoded in key
//! order with type tags, so reordering a config file is harmless while any
//! value change re-fingerprints.
//!
//! ### [`ArtifactStrategy`]
//!
//! A file on disk (compiled model, rules file, script). The fingerprint is
//! derived from the file's SHA-256; the path itself is not part of it.
//!
//! ### [`VersionTag`]
//!
//! An explicit version string for strategies whose definition is not
//! available to the gate.
//!
//! ## Config files
//!
//! [`StrategyDescriptor`] is the serde-tagged union of the three, used by the
//! daemon's `[[strategies]]` tables.

pub mod artifact;
pub mod canonical;
pub mod descriptor;
pub mod parameterized;
pub mod version_tag;

pub use artifact::ArtifactStrategy;
pub use canonical::{canonical_hash, CanonicalWriter, ENCODING_VERSION};
pub use descriptor::{validate_all, DescriptorError, StrategyDescriptor};
pub use parameterized::{ParamValue, ParameterizedStrategy};
pub use version_tag::VersionTag;
