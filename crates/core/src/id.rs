//! Task identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of a task, shaped `stage{N}-task{K}`.
///
/// `N` is the stage number taken from the heading and `K` the zero-based
/// position of the task inside that stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Build the id for the `sequence`-th task of `stage`.
    pub fn new(stage: u32, sequence: u32) -> Self {
        Self(format!("stage{}-task{}", stage, sequence))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into `(stage, sequence)`.
    pub fn parts(&self) -> Option<(u32, u32)> {
        let rest = self.0.strip_prefix("stage")?;
        let (stage, sequence) = rest.split_once("-task")?;
        Some((stage.parse().ok()?, sequence.parse().ok()?))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.trim().to_string());
        match id.parts() {
            Some(_) => Ok(id),
            None => Err(crate::CoreError::InvalidTaskId(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parts() {
        let id = TaskId::new(2, 7);
        assert_eq!(id.as_str(), "stage2-task7");
        assert_eq!(id.parts(), Some((2, 7)));
    }

    #[test]
    fn test_from_str_rejects_garbage() {
        assert!("stage1-task0".parse::<TaskId>().is_ok());
        assert!("task-1".parse::<TaskId>().is_err());
        assert!("stageX-task0".parse::<TaskId>().is_err());
    }
}
