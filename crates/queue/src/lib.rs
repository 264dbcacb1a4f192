//! Durable job queue and worker around the orchestrator.
//!
//! Each job asks for one orchestrator cycle for one task. The queue keeps at
//! most one job active, orders jobs by stage then position, delays retried
//! tasks and backs off on infrastructure failures. The worker adds a
//! periodic scheduler tick that re-derives the next runnable task from the
//! persisted run state, so a lost job is recreated on the next tick.

#![warn(missing_docs)]

pub mod job;
pub mod queue;
pub mod worker;
pub mod handler;

pub use job::{Job, JobCounts, JobFailure, JobId, JobSnapshot, JobSpec, JobState};
pub use queue::{EnqueueOutcome, JobHandle, JobQueue, QueueConfig};
pub use worker::{JobHandler, JobSource, Worker, WorkerConfig};

use std::path::PathBuf;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by the queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The job is not the active one
    #[error("job {0} is not active")]
    NotActive(JobId),

    /// No such job
    #[error("job {0} not found")]
    UnknownJob(JobId),

    /// The snapshot file could not be encoded or decoded
    #[error("invalid job snapshot {}: {source}", .path.display())]
    Snapshot {
        /// Snapshot file
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
