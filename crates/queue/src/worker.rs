//! Worker loop: poll the queue, run one job at a time, keep the queue fed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{EnqueueOutcome, Job, JobFailure, JobQueue, JobSpec, JobState};

/// Runs the work a job stands for.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handle `job`, returning a short summary on success.
    async fn handle(&self, job: &Job) -> std::result::Result<String, JobFailure>;
}

/// Derives the next job from durable state.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// The job that should be queued next, if any.
    async fn next_job(&self) -> std::result::Result<Option<JobSpec>, JobFailure>;
}

/// Worker timing.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often the next runnable task is re-derived and enqueued
    pub scheduler_interval: Duration,
    /// How often the queue is polled for a ready job
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(600),
            poll_interval: Duration::from_millis(1000),
        }
    }
}

/// Single-slot worker.
pub struct Worker {
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    source: Arc<dyn JobSource>,
    config: WorkerConfig,
}

impl Worker {
    /// Create a worker over `queue`.
    pub fn new(queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>, source: Arc<dyn JobSource>) -> Self {
        Self {
            queue,
            handler,
            source,
            config: WorkerConfig::default(),
        }
    }

    /// Set the timing configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// The queue this worker drains.
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Ask the source for the next runnable task and enqueue it.
    ///
    /// When the source has nothing runnable (the pipeline is paused or done),
    /// held tasks are released: whatever it offers next reflects an operator
    /// decision made after the fatal failure.
    pub async fn schedule(&self) -> Option<EnqueueOutcome> {
        let spec = match self.source.next_job().await {
            Ok(Some(spec)) => spec,
            Ok(None) => {
                debug!("Nothing runnable to schedule");
                self.queue.release_held().await;
                return None;
            }
            Err(failure) => {
                warn!(error = %failure, "Scheduler could not derive the next job");
                return None;
            }
        };

        match self.queue.enqueue(spec).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(error = %e, "Failed to enqueue job");
                None
            }
        }
    }

    /// Fetch and handle one job. Returns the state the job ended in, or
    /// `None` when nothing was ready.
    ///
    /// A handler still running when the job's lock expires is dropped and the
    /// job is released as stalled.
    pub async fn process_next(&self) -> Option<JobState> {
        let job = self.queue.fetch_next().await?;
        info!(job_id = %job.id, task_id = %job.task_id, attempt = job.attempts_made, "Processing job");

        let lock = self.queue.config().lock_duration;
        let settled = match tokio::time::timeout(lock, self.handler.handle(&job)).await {
            Err(_) => {
                warn!(job_id = %job.id, lock_secs = lock.as_secs(), "Handler outlived the job lock");
                for id in self.queue.recover_stalled().await {
                    warn!(job_id = %id, "Released stalled job");
                }
                return self.queue.job(&job.id).await.map(|j| j.state);
            }
            Ok(Ok(summary)) => {
                info!(job_id = %job.id, summary = %summary, "Job completed");
                self.queue.complete(&job.id, summary).await.map(|()| JobState::Completed)
            }
            Ok(Err(failure)) => {
                warn!(job_id = %job.id, retryable = failure.retryable, error = %failure, "Job failed");
                self.queue.fail(&job.id, failure).await
            }
        };

        match settled {
            Ok(state) => Some(state),
            Err(e) => {
                // The lock expired while the handler ran and the job was released.
                warn!(job_id = %job.id, error = %e, "Could not settle job");
                self.queue.job(&job.id).await.map(|j| j.state)
            }
        }
    }

    /// Run until `shutdown` resolves. A job in flight is finished first.
    ///
    /// Only a completed job triggers an immediate schedule. After a failure
    /// the next job waits for the periodic tick, so neither a fatal error nor
    /// an exhausted retry budget turns into a tight loop.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let mut scheduler = tokio::time::interval(self.config.scheduler_interval);
        let mut poll = tokio::time::interval(self.config.poll_interval);
        for ticker in [&mut scheduler, &mut poll] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }

        info!(
            scheduler_secs = self.config.scheduler_interval.as_secs(),
            "Worker started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping worker");
                    break;
                }
                _ = scheduler.tick() => {
                    if let Some(EnqueueOutcome::Queued(handle)) = self.schedule().await {
                        debug!(job_id = %handle.id, "Scheduler tick enqueued job");
                    }
                }
                _ = poll.tick() => {
                    let Some(state) = self.process_next().await else {
                        continue;
                    };
                    if state == JobState::Completed {
                        self.schedule().await;
                    }
                    info!(counts = %self.queue.counts().await, "Queue status");
                }
            }
        }

        info!(counts = %self.queue.counts().await, "Worker stopped");
    }
}
