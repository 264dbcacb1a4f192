//! Job model.

use std::fmt;

use autodev_core::{Task, TaskId, Time};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Job ID type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl JobId {
    /// Create a new job ID
    pub fn new() -> Self {
        Self(format!("job_{}", ulid::Ulid::new()))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready to run, ordered by priority
    Waiting,
    /// Held back until its delay expires
    Delayed,
    /// Fetched by the worker
    Active,
    /// Handler finished
    Completed,
    /// Gave up
    Failed,
}

impl JobState {
    /// Whether the job still counts as queued for deduplication.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Waiting | Self::Delayed | Self::Active)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Request to run one orchestrator cycle for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Task the cycle is for
    pub task_id: TaskId,
    /// Index of the task in the run state
    pub task_index: usize,
    /// Stage number
    pub stage: u32,
    /// Position within the stage
    pub sequence: u32,
    /// Failed attempts so far; drives the start delay
    pub retry_level: u32,
}

impl JobSpec {
    /// Spec for `task` sitting at `index`.
    pub fn for_task(task: &Task, index: usize) -> Self {
        Self {
            task_id: task.id.clone(),
            task_index: index,
            stage: task.stage,
            sequence: task.sequence,
            retry_level: task.retry_count,
        }
    }

    /// `stage * 100 + sequence`; lower runs first.
    pub fn priority(&self) -> u64 {
        u64::from(self.stage) * 100 + u64::from(self.sequence)
    }
}

/// Why a handler run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Error message
    pub message: String,
    /// Whether the queue should retry the job with backoff
    pub retryable: bool,
}

impl JobFailure {
    /// A transient failure worth retrying.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure retrying cannot fix.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Job information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,
    /// Task the job runs a cycle for
    pub task_id: TaskId,
    /// Index of the task when the job was created
    pub task_index: usize,
    /// Queue priority, lower first
    pub priority: u64,
    /// Task retry count when the job was created
    pub retry_level: u32,
    /// Current state
    pub state: JobState,
    /// Handler runs started so far
    pub attempts_made: u32,
    /// Created timestamp
    pub created_at: Time,
    /// Wall-clock time the job becomes runnable
    pub run_after: Option<Time>,
    /// Finished timestamp
    pub finished_at: Option<Time>,
    /// Handler summary on completion
    pub result: Option<String>,
    /// Last failure
    pub last_error: Option<JobFailure>,
    /// Monotonic time the job becomes runnable
    #[serde(skip)]
    pub(crate) not_before: Option<Instant>,
    /// Lock expiry while active
    #[serde(skip)]
    pub(crate) locked_until: Option<Instant>,
}

impl Job {
    pub(crate) fn new(spec: JobSpec, delay: std::time::Duration, now: Instant) -> Self {
        let delayed = !delay.is_zero();
        let created_at = chrono::Utc::now();
        Self {
            id: JobId::new(),
            priority: spec.priority(),
            task_id: spec.task_id,
            task_index: spec.task_index,
            retry_level: spec.retry_level,
            state: if delayed { JobState::Delayed } else { JobState::Waiting },
            attempts_made: 0,
            created_at,
            run_after: delayed.then(|| created_at + wall(delay)),
            finished_at: None,
            result: None,
            last_error: None,
            not_before: delayed.then(|| now + delay),
            locked_until: None,
        }
    }
}

pub(crate) fn wall(d: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Ready to run
    pub waiting: usize,
    /// Running
    pub active: usize,
    /// Finished since start
    pub completed: usize,
    /// Gave up since start
    pub failed: usize,
    /// Waiting on a delay
    pub delayed: usize,
    /// Ready but held because the queue is paused
    pub paused: usize,
    /// Tasks kept out of the queue after a fatal failure
    pub held: usize,
}

impl fmt::Display for JobCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "waiting={} active={} delayed={} paused={} completed={} failed={} held={}",
            self.waiting, self.active, self.delayed, self.paused, self.completed, self.failed, self.held
        )
    }
}

/// Persisted queue snapshot (for jobs.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Snapshot version
    pub version: u32,
    /// Last updated timestamp
    pub updated_at: Time,
    /// Whether fetching was paused
    #[serde(default)]
    pub paused: bool,
    /// Jobs snapshot
    pub jobs: Vec<Job>,
}

impl Default for JobSnapshot {
    fn default() -> Self {
        Self {
            version: 1,
            updated_at: chrono::Utc::now(),
            paused: false,
            jobs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_is_stage_then_sequence() {
        let spec = |stage, sequence| JobSpec {
            task_id: TaskId::new(stage, sequence),
            task_index: 0,
            stage,
            sequence,
            retry_level: 0,
        };
        assert_eq!(spec(0, 4).priority(), 4);
        assert_eq!(spec(2, 1).priority(), 201);
        assert!(spec(1, 99).priority() < spec(2, 0).priority());
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::new();
        assert!(a.0.starts_with("job_"));
        assert_ne!(a, JobId::new());
    }
}
