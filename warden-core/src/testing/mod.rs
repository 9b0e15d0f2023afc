//! Helpers for tests and simulations
//!
//! - `StaticDefinition`: in-memory strategy definition whose source can be mutated
//! - `outcome_series`: build outcome samples from a win/loss pattern
//! - `MemorySink`: alert sink that keeps everything it receives

pub mod helpers;

pub use helpers::{outcome_series, outcomes_from_pattern, MemorySink, StaticDefinition};
