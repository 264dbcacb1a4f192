//! Orchestrator as job handler and job source.

use async_trait::async_trait;
use autodev_execution::{CursorSelector, CycleOutcome, Orchestrator, OrchestratorError, TaskSelector};
use tracing::{info, warn};

use crate::{Job, JobFailure, JobHandler, JobSource, JobSpec};

impl From<OrchestratorError> for JobFailure {
    /// Structural errors stop the job; anything else is left to queue backoff.
    fn from(e: OrchestratorError) -> Self {
        if e.is_structural() {
            JobFailure::fatal(e.to_string())
        } else {
            JobFailure::retryable(e.to_string())
        }
    }
}

#[async_trait]
impl JobHandler for Orchestrator {
    async fn handle(&self, job: &Job) -> Result<String, JobFailure> {
        let state = self.state().await?;

        // A job outlived its task: the cursor moved on or the pipeline stopped.
        match state.current_task() {
            Some(task) if task.id == job.task_id => {}
            current => {
                info!(
                    job_id = %job.id,
                    task_id = %job.task_id,
                    current = ?current.map(|t| t.id.to_string()),
                    "Skipping stale job"
                );
                return Ok(format!("skipped: {} is no longer current", job.task_id));
            }
        }

        match self.run_cycle().await {
            Ok(outcome) => Ok(describe(&outcome)),
            Err(e) if e.is_structural() => {
                // Surface it where the operator looks; resuming clears the hold.
                if let Err(halt_error) = self.halt(format!("halted on {}: {}", job.task_id, e)).await {
                    warn!(error = %halt_error, "Could not pause pipeline after structural error");
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl JobSource for Orchestrator {
    async fn next_job(&self) -> Result<Option<JobSpec>, JobFailure> {
        let state = self.state().await?;
        Ok(CursorSelector::new()
            .select(&state)
            .map(|task| JobSpec::for_task(task, state.current_task_index)))
    }
}

fn describe(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Idle { status, .. } => format!("pipeline {}", status),
        CycleOutcome::NoTask => "no task".to_string(),
        CycleOutcome::Completed { task_id, pipeline_completed: true } => {
            format!("{} completed, pipeline completed", task_id)
        }
        CycleOutcome::Completed { task_id, .. } => format!("{} completed", task_id),
        CycleOutcome::Retrying { task_id, retry_count, error } => {
            format!("{} failed (retry {}): {}", task_id, retry_count, error)
        }
        CycleOutcome::Blocked { task_id, .. } => format!("{} blocked, pipeline paused", task_id),
    }
}
