//! In-memory state store.

use std::path::PathBuf;

use async_trait::async_trait;
use autodev_core::RunState;
use tokio::sync::Mutex;

use super::{Result, StateStore, StorageError};

/// State store that keeps the run state in memory. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<RunState>>,
    saves: Mutex<usize>,
}

impl MemoryStateStore {
    /// Create an empty, uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `state`.
    pub fn with_state(state: RunState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves performed so far.
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<RunState> {
        self.state
            .lock()
            .await
            .clone()
            .ok_or_else(|| StorageError::NotInitialized(PathBuf::from("<memory>")))
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        *self.state.lock().await = Some(state.clone());
        *self.saves.lock().await += 1;
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state.lock().await.is_some())
    }
}
