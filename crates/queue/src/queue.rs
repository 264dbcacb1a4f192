//! Priority job queue with delays, backoff and a single active slot.
//!
//! Ready jobs sit in a min-heap keyed by `(priority, seq)`; delayed jobs sit
//! in a min-heap keyed by their not-before instant and are promoted when due.
//! Heap entries are not removed eagerly, so every pop re-checks the job's
//! current state.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use autodev_core::TaskId;

use crate::job::wall;
use crate::{Job, JobCounts, JobFailure, JobId, JobSnapshot, JobSpec, JobState, QueueError, Result};

/// Queue settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a fetched job may run before it is considered stalled.
    /// Must exceed the agent timeout plus the verification timeout.
    pub lock_duration: Duration,
    /// Handler runs per job before an infrastructure failure is final
    pub max_attempts: u32,
    /// First infrastructure backoff; doubles per attempt
    pub backoff_base: Duration,
    /// Start delay unit for retried tasks; doubles per retry level
    pub retry_delay_unit: Duration,
    /// Finished jobs kept for inspection
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(1200),
            max_attempts: 3,
            backoff_base: Duration::from_secs(30),
            retry_delay_unit: Duration::from_secs(60),
            history_limit: 100,
        }
    }
}

impl QueueConfig {
    /// Start delay for a job at `retry_level`: none for a fresh task, then
    /// 1, 2, 4 units for retry levels 1, 2, 3 and above.
    pub fn start_delay(&self, retry_level: u32) -> Duration {
        match retry_level {
            0 => Duration::ZERO,
            n => self.retry_delay_unit * (1u32 << (n.min(3) - 1)),
        }
    }

    /// Infrastructure backoff after the `attempts_made`-th failed run.
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        self.backoff_base * (1u32 << attempts_made.saturating_sub(1).min(16))
    }
}

/// Handle to a queued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Job id
    pub id: JobId,
    /// State right after enqueue
    pub state: JobState,
    /// Start delay
    pub delay: Duration,
}

/// Result of [`JobQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new job was added
    Queued(JobHandle),
    /// A job for the same task is already waiting, delayed or active
    AlreadyQueued(JobId),
    /// The task's last job failed with a non-retryable error; it stays out
    /// of the queue until [`JobQueue::release_held`] or [`JobQueue::resume`]
    Held(JobId),
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    ready: BinaryHeap<Reverse<(u64, u64, JobId)>>,
    delayed: BinaryHeap<Reverse<(Instant, u64, JobId)>>,
    active: Option<JobId>,
    finished: VecDeque<JobId>,
    held: HashMap<TaskId, JobId>,
    paused: bool,
    seq: u64,
    completed_total: usize,
    failed_total: usize,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn push_ready(&mut self, id: JobId) {
        let Some(priority) = self.jobs.get(&id).map(|j| j.priority) else {
            return;
        };
        let seq = self.next_seq();
        self.ready.push(Reverse((priority, seq, id)));
    }

    fn push_delayed(&mut self, id: JobId, at: Instant) {
        let seq = self.next_seq();
        self.delayed.push(Reverse((at, seq, id)));
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((at, _, _))) = self.delayed.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, _, id))) = self.delayed.pop() else {
                break;
            };
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            if job.state != JobState::Delayed {
                continue;
            }
            job.state = JobState::Waiting;
            job.not_before = None;
            job.run_after = None;
            self.push_ready(id);
        }
    }

    fn finish(&mut self, id: &JobId, history_limit: usize) {
        if self.active.as_ref() == Some(id) {
            self.active = None;
        }
        self.finished.push_back(id.clone());
        while self.finished.len() > history_limit {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        let mut jobs: Vec<Job> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        JobSnapshot {
            updated_at: Utc::now(),
            paused: self.paused,
            jobs,
            ..Default::default()
        }
    }
}

/// In-process job queue with at most one active job.
pub struct JobQueue {
    inner: Mutex<Inner>,
    config: QueueConfig,
    snapshot_path: Option<PathBuf>,
}

impl JobQueue {
    /// Create an empty queue that lives in memory only.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            snapshot_path: None,
        }
    }

    /// Open a queue persisted at `path`, restoring unfinished jobs.
    ///
    /// Jobs that were active when the previous process stopped are put back
    /// to waiting; their interrupted run counts as an attempt. This is how a
    /// job stalled by a crash is recovered. Held tasks are not restored, so a
    /// restart releases them.
    pub async fn open(config: QueueConfig, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let queue = Self {
            inner: Mutex::new(Inner::default()),
            config,
            snapshot_path: Some(path.clone()),
        };

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(queue),
            Err(e) => return Err(e.into()),
        };
        let snapshot: JobSnapshot =
            serde_json::from_str(&content).map_err(|source| QueueError::Snapshot { path: path.clone(), source })?;

        {
            let mut inner = queue.inner.lock().await;
            inner.paused = snapshot.paused;
            let now = Instant::now();
            let wall_now = Utc::now();

            for mut job in snapshot.jobs {
                let id = job.id.clone();
                match job.state {
                    JobState::Active | JobState::Waiting => {
                        if job.state == JobState::Active {
                            warn!(job_id = %id, task_id = %job.task_id, "Recovering job interrupted by restart");
                        }
                        job.state = JobState::Waiting;
                        job.locked_until = None;
                        inner.jobs.insert(id.clone(), job);
                        inner.push_ready(id);
                    }
                    JobState::Delayed => {
                        let remaining = job
                            .run_after
                            .and_then(|at| (at - wall_now).to_std().ok())
                            .unwrap_or(Duration::ZERO);
                        let at = now + remaining;
                        job.not_before = Some(at);
                        inner.jobs.insert(id.clone(), job);
                        inner.push_delayed(id, at);
                    }
                    JobState::Completed | JobState::Failed => {
                        inner.jobs.insert(id.clone(), job);
                        inner.finished.push_back(id);
                    }
                }
            }
            info!(jobs = inner.jobs.len(), path = %path.display(), "Restored job queue");
        }

        Ok(queue)
    }

    /// Queue settings.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add a job unless one for the same task is already pending or the
    /// task is held.
    pub async fn enqueue(&self, spec: JobSpec) -> Result<EnqueueOutcome> {
        let mut inner = self.inner.lock().await;

        if let Some(failed) = inner.held.get(&spec.task_id) {
            debug!(task_id = %spec.task_id, job_id = %failed, "Task is held after a fatal failure");
            return Ok(EnqueueOutcome::Held(failed.clone()));
        }

        if let Some(existing) = inner
            .jobs
            .values()
            .find(|j| j.task_id == spec.task_id && j.state.is_pending())
        {
            debug!(task_id = %spec.task_id, job_id = %existing.id, "Job already queued");
            return Ok(EnqueueOutcome::AlreadyQueued(existing.id.clone()));
        }

        let delay = self.config.start_delay(spec.retry_level);
        let job = Job::new(spec, delay, Instant::now());
        let handle = JobHandle {
            id: job.id.clone(),
            state: job.state,
            delay,
        };

        info!(
            job_id = %job.id,
            task_id = %job.task_id,
            priority = job.priority,
            delay_secs = delay.as_secs(),
            "Enqueued job"
        );

        let not_before = job.not_before;
        inner.jobs.insert(job.id.clone(), job);
        match not_before {
            Some(at) => inner.push_delayed(handle.id.clone(), at),
            None => inner.push_ready(handle.id.clone()),
        }

        self.persist(&inner).await;
        Ok(EnqueueOutcome::Queued(handle))
    }

    /// Take the highest-priority ready job and lock it.
    ///
    /// Returns `None` while paused, while another job is active, or when
    /// nothing is due.
    pub async fn fetch_next(&self) -> Option<Job> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.promote_due(now);

        if inner.paused || inner.active.is_some() {
            return None;
        }

        while let Some(Reverse((_, _, id))) = inner.ready.pop() {
            let lock_duration = self.config.lock_duration;
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if job.state != JobState::Waiting {
                continue;
            }

            job.state = JobState::Active;
            job.attempts_made += 1;
            job.locked_until = Some(now + lock_duration);
            let job = job.clone();

            inner.active = Some(id);
            debug!(job_id = %job.id, task_id = %job.task_id, attempt = job.attempts_made, "Fetched job");
            self.persist(&inner).await;
            return Some(job);
        }

        None
    }

    /// Mark the active job done.
    pub async fn complete(&self, id: &JobId, summary: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let job = active_job(&mut inner, id)?;

        job.state = JobState::Completed;
        job.locked_until = None;
        job.finished_at = Some(Utc::now());
        job.result = Some(summary.into());

        inner.completed_total += 1;
        inner.finish(id, self.config.history_limit);
        self.persist(&inner).await;
        Ok(())
    }

    /// Record a failed handler run.
    ///
    /// Retryable failures come back after an exponential backoff until
    /// `max_attempts` runs were made; anything else fails the job for good.
    /// A non-retryable failure also holds the task, so later enqueues for it
    /// are refused until released. Returns the state the job ended up in.
    pub async fn fail(&self, id: &JobId, failure: JobFailure) -> Result<JobState> {
        let mut inner = self.inner.lock().await;
        let max_attempts = self.config.max_attempts;
        let job = active_job(&mut inner, id)?;

        job.locked_until = None;
        let fatal = !failure.retryable;
        let retry = !fatal && job.attempts_made < max_attempts;
        job.last_error = Some(failure);

        if retry {
            let backoff = self.config.backoff(job.attempts_made);
            let at = Instant::now() + backoff;
            job.state = JobState::Delayed;
            job.not_before = Some(at);
            job.run_after = Some(Utc::now() + wall(backoff));
            warn!(job_id = %id, attempt = job.attempts_made, backoff_secs = backoff.as_secs(), "Job failed, backing off");

            inner.active = None;
            inner.push_delayed(id.clone(), at);
            self.persist(&inner).await;
            Ok(JobState::Delayed)
        } else {
            job.state = JobState::Failed;
            job.finished_at = Some(Utc::now());
            warn!(job_id = %id, attempt = job.attempts_made, fatal, "Job failed permanently");

            if fatal {
                let task_id = job.task_id.clone();
                inner.held.insert(task_id, id.clone());
            }
            inner.failed_total += 1;
            inner.finish(id, self.config.history_limit);
            self.persist(&inner).await;
            Ok(JobState::Failed)
        }
    }

    /// Release an active job whose lock expired.
    ///
    /// The worker calls this when a handler outlives the lock. The job goes
    /// back to waiting, or fails once it used up its attempts. Returns the
    /// ids that were released.
    pub async fn recover_stalled(&self) -> Vec<JobId> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let Some(id) = inner.active.clone() else {
            return Vec::new();
        };
        let max_attempts = self.config.max_attempts;
        let Some(job) = inner.jobs.get_mut(&id) else {
            inner.active = None;
            return Vec::new();
        };
        if !job.locked_until.is_some_and(|until| until <= now) {
            return Vec::new();
        }

        job.locked_until = None;
        job.last_error = Some(JobFailure::retryable("job stalled: lock expired"));
        if job.attempts_made < max_attempts {
            warn!(job_id = %id, task_id = %job.task_id, "Job stalled, returning it to the queue");
            job.state = JobState::Waiting;
            inner.active = None;
            inner.push_ready(id.clone());
        } else {
            warn!(job_id = %id, task_id = %job.task_id, "Job stalled too often, failing it");
            job.state = JobState::Failed;
            job.finished_at = Some(Utc::now());
            inner.failed_total += 1;
            inner.finish(&id, self.config.history_limit);
        }

        self.persist(&inner).await;
        vec![id]
    }

    /// Stop handing out jobs. Queued jobs stay queued.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        inner.paused = true;
        info!("Job queue paused");
        self.persist(&inner).await;
    }

    /// Resume handing out jobs and release every held task.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        inner.paused = false;
        inner.held.clear();
        info!("Job queue resumed");
        self.persist(&inner).await;
    }

    /// Let held tasks be enqueued again. Returns the released task ids.
    pub async fn release_held(&self) -> Vec<TaskId> {
        let mut inner = self.inner.lock().await;
        let mut released: Vec<TaskId> = inner.held.drain().map(|(task_id, _)| task_id).collect();
        released.sort();
        if !released.is_empty() {
            info!(tasks = ?released, "Released held tasks");
        }
        released
    }

    /// Whether fetching is paused.
    pub async fn is_paused(&self) -> bool {
        self.inner.lock().await.paused
    }

    /// Number of jobs per state.
    pub async fn counts(&self) -> JobCounts {
        let mut inner = self.inner.lock().await;
        inner.promote_due(Instant::now());

        let mut counts = JobCounts {
            completed: inner.completed_total,
            failed: inner.failed_total,
            held: inner.held.len(),
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.state {
                JobState::Waiting if inner.paused => counts.paused += 1,
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Completed | JobState::Failed => {}
            }
        }
        counts
    }

    /// Look up a job that is still known to the queue.
    pub async fn job(&self, id: &JobId) -> Option<Job> {
        self.inner.lock().await.jobs.get(id).cloned()
    }

    /// Unfinished jobs in fetch order.
    pub async fn pending(&self) -> Vec<Job> {
        let inner = self.inner.lock().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.state.is_pending())
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.state != JobState::Active, j.priority));
        jobs
    }

    async fn persist(&self, inner: &Inner) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        if let Err(e) = write_snapshot(path, &inner.snapshot()).await {
            warn!(error = %e, path = %path.display(), "Failed to persist job queue");
        }
    }
}

fn active_job<'a>(inner: &'a mut Inner, id: &JobId) -> Result<&'a mut Job> {
    if inner.active.as_ref() != Some(id) {
        return Err(QueueError::NotActive(id.clone()));
    }
    inner
        .jobs
        .get_mut(id)
        .ok_or_else(|| QueueError::UnknownJob(id.clone()))
}

async fn write_snapshot(path: &Path, snapshot: &JobSnapshot) -> Result<()> {
    let json = serde_json::to_vec_pretty(snapshot).map_err(|source| QueueError::Snapshot {
        path: path.to_path_buf(),
        source,
    })?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodev_core::TaskId;

    fn spec(stage: u32, sequence: u32, retry_level: u32) -> JobSpec {
        JobSpec {
            task_id: TaskId::new(stage, sequence),
            task_index: 0,
            stage,
            sequence,
            retry_level,
        }
    }

    fn queued(outcome: EnqueueOutcome) -> JobHandle {
        match outcome {
            EnqueueOutcome::Queued(handle) => handle,
            EnqueueOutcome::AlreadyQueued(id) => panic!("unexpectedly deduplicated onto {id}"),
            EnqueueOutcome::Held(id) => panic!("unexpectedly held by {id}"),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let config = QueueConfig::default();
        let minutes: Vec<u64> = (0..=5).map(|n| config.start_delay(n).as_secs() / 60).collect();
        assert_eq!(minutes, vec![0, 1, 2, 4, 4, 4]);
        assert_eq!(config.backoff(1), Duration::from_secs(30));
        assert_eq!(config.backoff(3), Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_is_idempotent_per_task() {
        let queue = JobQueue::new(QueueConfig::default());

        let first = queued(queue.enqueue(spec(1, 0, 0)).await.unwrap());
        assert_eq!(
            queue.enqueue(spec(1, 0, 0)).await.unwrap(),
            EnqueueOutcome::AlreadyQueued(first.id.clone())
        );

        // Still deduplicated while active.
        let job = queue.fetch_next().await.unwrap();
        assert_eq!(job.id, first.id);
        assert!(matches!(
            queue.enqueue(spec(1, 0, 1)).await.unwrap(),
            EnqueueOutcome::AlreadyQueued(_)
        ));
        assert_eq!(queue.pending().await.len(), 1);

        // Finished jobs do not block a new one.
        queue.complete(&job.id, "done").await.unwrap();
        assert!(matches!(queue.enqueue(spec(1, 0, 0)).await.unwrap(), EnqueueOutcome::Queued(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_beats_arrival_order() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(2, 0, 0)).await.unwrap();
        queue.enqueue(spec(1, 3, 0)).await.unwrap();
        queue.enqueue(spec(1, 1, 0)).await.unwrap();

        let mut order = Vec::new();
        while let Some(job) = queue.fetch_next().await {
            order.push(job.task_id.to_string());
            queue.complete(&job.id, "ok").await.unwrap();
        }
        assert_eq!(order, vec!["stage1-task1", "stage1-task3", "stage2-task0"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_active_job() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(0, 0, 0)).await.unwrap();
        queue.enqueue(spec(0, 1, 0)).await.unwrap();

        let first = queue.fetch_next().await.unwrap();
        assert!(queue.fetch_next().await.is_none());
        assert_eq!(queue.counts().await.active, 1);

        queue.complete(&first.id, "ok").await.unwrap();
        assert!(queue.fetch_next().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_task_is_delayed() {
        let queue = JobQueue::new(QueueConfig::default());
        let handle = queued(queue.enqueue(spec(0, 0, 2)).await.unwrap());
        assert_eq!(handle.state, JobState::Delayed);
        assert_eq!(handle.delay, Duration::from_secs(120));

        assert!(queue.fetch_next().await.is_none());
        assert_eq!(queue.counts().await.delayed, 1);

        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(queue.fetch_next().await.is_none());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(queue.fetch_next().await.unwrap().id, handle.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_infrastructure_failure_backs_off_then_fails() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(0, 0, 0)).await.unwrap();

        let job = queue.fetch_next().await.unwrap();
        let state = queue.fail(&job.id, JobFailure::retryable("disk full")).await.unwrap();
        assert_eq!(state, JobState::Delayed);
        assert!(queue.fetch_next().await.is_none());

        tokio::time::advance(Duration::from_secs(30)).await;
        let job = queue.fetch_next().await.unwrap();
        assert_eq!(job.attempts_made, 2);
        queue.fail(&job.id, JobFailure::retryable("disk full")).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(queue.fetch_next().await.is_none());
        tokio::time::advance(Duration::from_secs(1)).await;
        let job = queue.fetch_next().await.unwrap();

        let state = queue.fail(&job.id, JobFailure::retryable("disk full")).await.unwrap();
        assert_eq!(state, JobState::Failed);
        let counts = queue.counts().await;
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.delayed + counts.waiting + counts.active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_is_not_retried() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(0, 0, 0)).await.unwrap();
        let job = queue.fetch_next().await.unwrap();

        let state = queue.fail(&job.id, JobFailure::fatal("dependencies unmet")).await.unwrap();
        assert_eq!(state, JobState::Failed);
        assert_eq!(queue.job(&job.id).await.unwrap().last_error.unwrap().message, "dependencies unmet");

        // The task stays out until an operator releases it.
        assert_eq!(queue.enqueue(spec(0, 0, 0)).await.unwrap(), EnqueueOutcome::Held(job.id.clone()));
        assert_eq!(queue.counts().await.held, 1);
        assert!(matches!(queue.enqueue(spec(0, 1, 0)).await.unwrap(), EnqueueOutcome::Queued(_)));

        assert_eq!(queue.release_held().await, vec![TaskId::new(0, 0)]);
        assert!(matches!(queue.enqueue(spec(0, 0, 0)).await.unwrap(), EnqueueOutcome::Queued(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_do_not_hold_task() {
        let queue = JobQueue::new(QueueConfig {
            max_attempts: 1,
            ..Default::default()
        });
        queue.enqueue(spec(0, 0, 0)).await.unwrap();
        let job = queue.fetch_next().await.unwrap();
        assert_eq!(queue.fail(&job.id, JobFailure::retryable("disk full")).await.unwrap(), JobState::Failed);

        assert_eq!(queue.counts().await.held, 0);
        assert!(matches!(queue.enqueue(spec(0, 0, 0)).await.unwrap(), EnqueueOutcome::Queued(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_releases_held_tasks() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(0, 0, 0)).await.unwrap();
        let job = queue.fetch_next().await.unwrap();
        queue.fail(&job.id, JobFailure::fatal("template missing")).await.unwrap();

        queue.pause().await;
        queue.resume().await;
        assert_eq!(queue.counts().await.held, 0);
        assert!(queue.release_held().await.is_empty());
        assert!(matches!(queue.enqueue(spec(0, 0, 0)).await.unwrap(), EnqueueOutcome::Queued(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_job_is_redelivered() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(0, 0, 0)).await.unwrap();
        let job = queue.fetch_next().await.unwrap();

        tokio::time::advance(Duration::from_secs(1199)).await;
        assert!(queue.recover_stalled().await.is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(queue.recover_stalled().await, vec![job.id.clone()]);
        assert!(matches!(queue.complete(&job.id, "late").await, Err(QueueError::NotActive(_))));

        let again = queue.fetch_next().await.unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts_made, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_jobs() {
        let queue = JobQueue::new(QueueConfig::default());
        queue.enqueue(spec(0, 0, 0)).await.unwrap();
        queue.pause().await;

        assert!(queue.fetch_next().await.is_none());
        let counts = queue.counts().await;
        assert_eq!((counts.waiting, counts.paused), (0, 1));

        queue.resume().await;
        assert!(queue.fetch_next().await.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");

        let active_id = {
            let queue = JobQueue::open(QueueConfig::default(), &path).await.unwrap();
            queue.enqueue(spec(0, 0, 0)).await.unwrap();
            queue.enqueue(spec(0, 1, 3)).await.unwrap();
            queue.fetch_next().await.unwrap().id
        };

        let queue = JobQueue::open(QueueConfig::default(), &path).await.unwrap();
        let counts = queue.counts().await;
        assert_eq!((counts.waiting, counts.delayed, counts.active), (1, 1, 0));

        let job = queue.fetch_next().await.unwrap();
        assert_eq!(job.id, active_id);
        assert_eq!(job.attempts_made, 2);
        assert!(matches!(queue.enqueue(spec(0, 1, 0)).await.unwrap(), EnqueueOutcome::AlreadyQueued(_)));
    }
}
