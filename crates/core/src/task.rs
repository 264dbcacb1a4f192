//! Task model - the unit of work handed to the coding agent.

use serde::{Deserialize, Serialize};
use crate::id::TaskId;
use crate::Time;

/// Number of failed attempts a task may accumulate before it is blocked.
pub const MAX_RETRIES: u32 = 3;

/// Highest prompt escalation level.
pub const MAX_PROMPT_LEVEL: u8 = 3;

/// A task parsed from the task list, plus its execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (`stage{N}-task{K}`)
    pub id: TaskId,

    /// Stage number from the heading
    pub stage: u32,

    /// Zero-based position inside the stage
    pub sequence: u32,

    /// Task title
    pub title: String,

    /// Detailed description
    pub description: String,

    /// Current status
    pub status: TaskStatus,

    /// Failed attempts since creation or the last reset
    pub retry_count: u32,

    /// Tasks that must be completed first; fixed at graph construction
    pub dependencies: Vec<TaskId>,

    /// Append-only attempt history
    pub attempts: Vec<Attempt>,

    /// Error of the most recent failed attempt
    pub last_error: Option<String>,

    /// When the task reached `completed`
    pub completed_at: Option<Time>,

    /// Optional shell script that must pass after the agent reports success
    #[serde(default)]
    pub verification_script: Option<String>,
}

/// Execution status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting to run (fresh or retrying)
    Pending,
    /// The agent is working on it
    Running,
    /// Done; terminal
    Completed,
    /// Retries exhausted; needs an operator
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// One recorded execution of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// When the attempt finished
    pub timestamp: Time,

    /// Prompt escalation level used
    pub prompt_level: u8,

    /// Whether the attempt was classified as a success
    pub success: bool,

    /// Failure reason, if any
    pub error: Option<String>,

    /// Wall-clock duration of the agent run
    pub duration_seconds: f64,

    /// Tail of the agent's output
    pub output_excerpt: String,
}

/// What a failed attempt did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// The task stays pending and will be retried at a higher prompt level.
    Retry {
        /// Retry count after this failure
        retry_count: u32,
    },
    /// Retries are exhausted and the task is blocked.
    Blocked {
        /// Retry count after this failure
        retry_count: u32,
    },
}

impl Task {
    /// Create a pending task with no dependencies.
    pub fn new(
        stage: u32,
        sequence: u32,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: TaskId::new(stage, sequence),
            stage,
            sequence,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            retry_count: 0,
            dependencies: Vec::new(),
            attempts: Vec::new(),
            last_error: None,
            completed_at: None,
            verification_script: None,
        }
    }

    /// Escalation level for the next attempt: `min(retry_count, 3)`.
    pub fn prompt_level(&self) -> u8 {
        self.retry_count.min(u32::from(MAX_PROMPT_LEVEL)) as u8
    }

    /// Retries left before the task is blocked.
    pub fn retries_remaining(&self, max_retries: u32) -> u32 {
        max_retries.saturating_sub(self.retry_count)
    }

    /// Queue priority: stage first, then position in the stage.
    pub fn priority(&self) -> u64 {
        u64::from(self.stage) * 100 + u64::from(self.sequence)
    }

    /// Whether the task is done.
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Failed attempts since the last success, oldest first.
    pub fn failed_attempts(&self) -> impl Iterator<Item = &Attempt> {
        let start = self
            .attempts
            .iter()
            .rposition(|a| a.success)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.attempts[start..].iter().filter(|a| !a.success)
    }

    /// Append a successful attempt and mark the task completed.
    pub fn record_success(&mut self, attempt: Attempt) {
        self.completed_at = Some(attempt.timestamp);
        self.attempts.push(attempt);
        self.status = TaskStatus::Completed;
        self.retry_count = 0;
    }

    /// Append a failed attempt, bump the retry count and block the task
    /// once it exceeds `max_retries`.
    pub fn record_failure(&mut self, attempt: Attempt, max_retries: u32) -> FailureDisposition {
        self.last_error = attempt.error.clone();
        self.attempts.push(attempt);
        self.retry_count += 1;

        if self.retry_count > max_retries {
            self.status = TaskStatus::Blocked;
            FailureDisposition::Blocked { retry_count: self.retry_count }
        } else {
            self.status = TaskStatus::Pending;
            FailureDisposition::Retry { retry_count: self.retry_count }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn failed(level: u8, error: &str) -> Attempt {
        Attempt {
            timestamp: Utc::now(),
            prompt_level: level,
            success: false,
            error: Some(error.to_string()),
            duration_seconds: 1.0,
            output_excerpt: String::new(),
        }
    }

    #[test]
    fn test_prompt_level_saturates() {
        let mut task = Task::new(0, 0, "t", "d");
        let mut levels = Vec::new();
        for _ in 0..6 {
            levels.push(task.prompt_level());
            task.retry_count += 1;
        }
        assert_eq!(levels, vec![0, 1, 2, 3, 3, 3]);
    }

    #[test]
    fn test_record_failure_blocks_after_budget() {
        let mut task = Task::new(0, 0, "t", "d");
        for i in 0..3 {
            let disposition = task.record_failure(failed(task.prompt_level(), "boom"), MAX_RETRIES);
            assert_eq!(disposition, FailureDisposition::Retry { retry_count: i + 1 });
            assert_eq!(task.status, TaskStatus::Pending);
        }

        let disposition = task.record_failure(failed(task.prompt_level(), "last"), MAX_RETRIES);
        assert_eq!(disposition, FailureDisposition::Blocked { retry_count: 4 });
        assert_eq!(task.status, TaskStatus::Blocked);
        assert_eq!(task.last_error.as_deref(), Some("last"));
        assert_eq!(task.attempts.len(), 4);
    }

    #[test]
    fn test_failed_attempts_since_last_success() {
        let mut task = Task::new(1, 2, "t", "d");
        task.attempts.push(failed(0, "a"));
        task.attempts.push(Attempt { success: true, error: None, ..failed(1, "") });
        task.attempts.push(failed(0, "b"));

        let errors: Vec<_> = task.failed_attempts().filter_map(|a| a.error.as_deref()).collect();
        assert_eq!(errors, vec!["b"]);
        assert_eq!(task.priority(), 102);
    }
}
