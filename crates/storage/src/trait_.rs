//! State store abstraction.

use std::path::PathBuf;

use async_trait::async_trait;
use autodev_core::RunState;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No state has been saved yet
    #[error("pipeline not initialized: no state at {0}")]
    NotInitialized(PathBuf),

    /// The state file exists but cannot be parsed
    #[error("state file {path} is corrupt: {source}")]
    Corrupt {
        /// State file path
        path: PathBuf,
        /// Parse error
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Whether the error needs an operator rather than a retry.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::NotInitialized(_) | Self::Corrupt { .. })
    }
}

/// Durable home of the run state.
///
/// `load` and `save` are the only mutation surface: every cycle reads the
/// whole state, changes it and writes the whole state back. Stores do not
/// arbitrate between concurrent writers; callers run one cycle at a time.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved state. Fails with `NotInitialized` when nothing was saved.
    async fn load(&self) -> Result<RunState>;

    /// Replace the stored state atomically.
    async fn save(&self, state: &RunState) -> Result<()>;

    /// Whether a state has been saved.
    async fn exists(&self) -> Result<bool>;
}
