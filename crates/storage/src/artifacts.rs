//! Audit artifacts: rendered prompts and agent invocation logs.

use std::path::{Path, PathBuf};

use autodev_core::TaskId;
use chrono::Utc;
use tokio::fs;

use super::Result;

/// Timestamp format used in artifact file names.
pub const FILE_TIMESTAMP: &str = "%Y%m%dT%H%M%S%.3fZ";

/// Directory layout for per-invocation files under the state directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Use `root` (normally the state directory) as the artifact root.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Directory holding retained prompts.
    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    /// Directory holding agent invocation logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Write a rendered prompt to `prompts/<timestamp>-<task>-L<level>.md`.
    pub async fn write_prompt(&self, task_id: &TaskId, level: u8, prompt: &str) -> Result<PathBuf> {
        let dir = self.prompts_dir();
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!(
            "{}-{}-L{}.md",
            Utc::now().format(FILE_TIMESTAMP),
            task_id,
            level
        ));
        fs::write(&path, prompt.as_bytes()).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_prompt_names_file_after_task_and_level() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(dir.path());

        let path = artifacts
            .write_prompt(&TaskId::new(1, 3), 2, "do the thing")
            .await
            .unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("-stage1-task3-L2.md"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "do the thing");
    }
}
