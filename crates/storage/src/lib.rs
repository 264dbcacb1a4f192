//! Storage for autodev run state.
//!
//! The run state lives in a single JSON document that is rewritten as a whole
//! on every save. Rendered prompts and agent logs are kept next to it as
//! audit artifacts.

#![warn(missing_docs)]

pub mod trait_;
pub mod json_storage;
pub mod memory;
pub mod artifacts;

pub use trait_::{StateStore, StorageError, Result};
pub use json_storage::JsonStateStore;
pub use memory::MemoryStateStore;
pub use artifacts::ArtifactStore;
