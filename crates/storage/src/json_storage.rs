//! JSON file state store.
//!
//! Keeps the run state in `<root>/state.json`. A save writes a temporary file
//! in the same directory, syncs it and renames it over the old one, so a
//! reader never observes a half-written document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use autodev_core::RunState;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{Result, StateStore, StorageError};

const STATE_FILE: &str = "state.json";

/// File-based JSON state store.
pub struct JsonStateStore {
    root: PathBuf,
}

impl JsonStateStore {
    /// Create the store, creating `root` if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Path of the state document.
    pub fn state_path(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(format!(".{}.{}.tmp", STATE_FILE, std::process::id()))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self) -> Result<RunState> {
        let path = self.state_path();
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotInitialized(path));
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&json).map_err(|source| StorageError::Corrupt { path, source })
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let temp = self.temp_path();

        let mut file = fs::File::create(&temp).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp, self.state_path()).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        debug!(
            path = %self.state_path().display(),
            status = %state.global_status,
            cursor = state.current_task_index,
            "Saved run state"
        );
        Ok(())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(fs::try_exists(self.state_path()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodev_core::{Attempt, TaskGraphBuilder};
    use chrono::Utc;

    #[tokio::test]
    async fn test_load_before_save_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path()).await.unwrap();

        assert!(!store.exists().await.unwrap());
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StorageError::NotInitialized(_)));
        assert!(err.is_structural());
    }

    #[tokio::test]
    async fn test_save_then_load_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join("nested")).await.unwrap();

        let mut state = TaskGraphBuilder::new().build_state("## Stage 0\n- [ ] a\n- [ ] b\n");
        state.tasks[0].attempts.push(Attempt {
            timestamp: Utc::now(),
            prompt_level: 0,
            success: false,
            error: Some("timeout".to_string()),
            duration_seconds: 600.0,
            output_excerpt: "partial".to_string(),
        });
        state.total_attempts = 1;
        state.pause("stage0-task0 blocked");

        store.save(&state).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path()).await.unwrap();
        let state = TaskGraphBuilder::new().build_state("## Stage 0\n- [ ] a\n");

        store.save(&state).await.unwrap();
        store.save(&state).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![STATE_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::new(dir.path()).await.unwrap();
        std::fs::write(store.state_path(), "{\"global_status\": \"runn").unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
