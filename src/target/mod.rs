//! Target module
//!
//! Lookup requests and their persisted definitions.

pub mod loader;
pub mod model;

pub use loader::{LoadedTargets, RejectedDefinition, TargetLoader};
pub use model::{sanitize_file_stem, Target, TargetDefinition, TargetKey, NO_HASH_SENTINEL};
