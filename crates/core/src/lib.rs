//! autodev core data models.
//!
//! This crate defines the task model, the run state that the orchestrator
//! persists after every attempt, and the builder that turns a markdown task
//! list into a dependency-ordered set of tasks.

#![warn(missing_docs)]

mod id;
mod task;
mod state;
mod graph;

pub use id::TaskId;
pub use task::{Task, TaskStatus, Attempt, FailureDisposition, MAX_RETRIES, MAX_PROMPT_LEVEL};
pub use state::{RunState, GlobalStatus, StatusCounts};
pub use graph::TaskGraphBuilder;

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Errors raised by operations on the run state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed task id
    #[error("invalid task id '{0}', expected stage<N>-task<K>")]
    InvalidTaskId(String),

    /// No task with this id
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// Reset was requested for a task that is not blocked
    #[error("task {0} is not blocked")]
    NotBlocked(TaskId),

    /// Resume was requested while the current task is still blocked
    #[error("task {0} is still blocked; reset it before resuming")]
    TaskBlocked(TaskId),

    /// The pipeline has nothing left to run
    #[error("pipeline already completed")]
    AlreadyCompleted,
}
