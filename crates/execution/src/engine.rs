//! The orchestrator: one attempt per cycle against the persisted run state.

use std::sync::Arc;
use std::time::Duration;

use autodev_agent::{
    excerpt, AgentError, AgentInvoker, Classification, InvocationOutput, MarkerClassifier,
    OutputClassifier, ScriptVerifier,
};
use autodev_core::{
    Attempt, FailureDisposition, GlobalStatus, RunState, Task, TaskId, TaskStatus, MAX_RETRIES,
};
use autodev_notify::{Notification, Notifier};
use autodev_prompt::PromptEscalationPolicy;
use autodev_storage::{ArtifactStore, StateStore};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{DependencyResolver, OrchestratorError, Resolution, Result};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard timeout for one agent run
    pub agent_timeout: Duration,
    /// Failed attempts allowed before a task is blocked
    pub max_retries: u32,
    /// Keep every rendered prompt as an audit file
    pub retain_prompts: bool,
    /// Characters of agent output kept in each attempt record
    pub output_excerpt_chars: usize,
    /// Timeout for a task's verification script
    pub verification_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(600),
            max_retries: MAX_RETRIES,
            retain_prompts: true,
            output_excerpt_chars: 2000,
            verification_timeout: Duration::from_secs(300),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The pipeline is paused or completed; nothing was touched
    Idle {
        /// Current global status
        status: GlobalStatus,
        /// Pause reason, if paused
        reason: Option<String>,
    },
    /// The cursor points at a finished task (or there are no tasks)
    NoTask,
    /// The task succeeded
    Completed {
        /// Task that completed
        task_id: TaskId,
        /// Whether it was the last one
        pipeline_completed: bool,
    },
    /// The task failed and will be retried
    Retrying {
        /// Task that failed
        task_id: TaskId,
        /// Retry count after this failure
        retry_count: u32,
        /// Failure reason
        error: String,
    },
    /// The task exhausted its retries; the pipeline is paused
    Blocked {
        /// Task that is blocked
        task_id: TaskId,
        /// Pause reason written to the state
        reason: String,
    },
}

impl CycleOutcome {
    /// Whether another cycle right away could make progress.
    pub fn should_continue(&self) -> bool {
        match self {
            Self::Completed { pipeline_completed, .. } => !pipeline_completed,
            Self::Retrying { .. } => true,
            Self::Idle { .. } | Self::NoTask | Self::Blocked { .. } => false,
        }
    }
}

/// Drives tasks through prompt, agent, classification and persistence.
///
/// ```text
/// load → gate → render → mark running → invoke → classify → verify → record → save → notify
/// ```
///
/// Callers must not run two cycles at once; the state store has no
/// concurrency control.
pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    prompts: PromptEscalationPolicy,
    invoker: Arc<dyn AgentInvoker>,
    classifier: Arc<dyn OutputClassifier>,
    resolver: DependencyResolver,
    verifier: ScriptVerifier,
    notifier: Notifier,
    artifacts: Option<ArtifactStore>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create an orchestrator with the default classifier and no notifications.
    pub fn new(
        store: Arc<dyn StateStore>,
        prompts: PromptEscalationPolicy,
        invoker: Arc<dyn AgentInvoker>,
    ) -> Self {
        Self {
            store,
            prompts,
            invoker,
            classifier: Arc::new(MarkerClassifier::default()),
            resolver: DependencyResolver::new(),
            verifier: ScriptVerifier::new(),
            notifier: Notifier::disabled(),
            artifacts: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Set the output classifier.
    pub fn with_classifier(mut self, classifier: Arc<dyn OutputClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Set the notifier.
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Set the verification script runner.
    pub fn with_verifier(mut self, verifier: ScriptVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Retain rendered prompts under `artifacts`.
    pub fn with_artifacts(mut self, artifacts: ArtifactStore) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Read-only snapshot of the persisted state.
    pub async fn state(&self) -> Result<RunState> {
        Ok(self.store.load().await?)
    }

    /// Run one attempt for the task under the cursor.
    ///
    /// Task-level failures (bad output, timeout, failed verification) become
    /// state transitions and an `Ok` outcome. Errors are either structural
    /// (see [`OrchestratorError::is_structural`]) or infrastructure failures
    /// the caller may retry.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let mut state = self.store.load().await?;

        if state.global_status != GlobalStatus::Running {
            info!(status = %state.global_status, reason = ?state.pause_reason, "Pipeline is not running");
            return Ok(CycleOutcome::Idle {
                status: state.global_status,
                reason: state.pause_reason.clone(),
            });
        }

        let index = state.current_task_index;
        let Some(task) = state.current_task() else {
            debug!("No tasks in pipeline");
            return Ok(CycleOutcome::NoTask);
        };

        match task.status {
            TaskStatus::Completed => {
                debug!(task_id = %task.id, "Task under cursor already completed");
                return Ok(CycleOutcome::NoTask);
            }
            TaskStatus::Blocked => {
                // Resumed without a reset: halt again rather than burn another attempt.
                let task_id = task.id.clone();
                let reason = pause_reason(task);
                warn!(task_id = %task_id, "Task under cursor is blocked, pausing");
                state.pause(reason.clone());
                self.store.save(&state).await?;
                return Ok(CycleOutcome::Blocked { task_id, reason });
            }
            TaskStatus::Running => {
                warn!(task_id = %task.id, "Recovering interrupted attempt");
            }
            TaskStatus::Pending => {}
        }

        if let Resolution::Blocked(unmet) = self.resolver.check(&state, task) {
            warn!(task_id = %task.id, ?unmet, "Dependencies not met");
            return Err(OrchestratorError::DependenciesUnmet {
                task_id: task.id.clone(),
                unmet,
            });
        }

        let task_id = task.id.clone();
        let prompt = self.prompts.build(&state, task).await?;
        info!(
            task_id = %task_id,
            level = prompt.level,
            retry_count = task.retry_count,
            position = index + 1,
            total = state.tasks.len(),
            "Starting attempt"
        );

        state.tasks[index].status = TaskStatus::Running;
        state.last_run = Some(Utc::now());
        self.store.save(&state).await?;

        if self.config.retain_prompts {
            if let Some(artifacts) = &self.artifacts {
                if let Err(e) = artifacts.write_prompt(&task_id, prompt.level, &prompt.text).await {
                    warn!(error = %e, task_id = %task_id, "Failed to retain prompt");
                }
            }
        }

        let started = Utc::now();
        let (output, verdict) = match self.invoker.invoke(&prompt.text, self.config.agent_timeout).await {
            Ok(output) => {
                let verdict =
                    self.classifier
                        .classify(output.exit_code, &output.output, &output.error_output);
                (output, verdict)
            }
            Err(AgentError::Timeout { partial, elapsed_seconds, .. }) => {
                warn!(task_id = %task_id, elapsed_seconds, "Agent timed out");
                (*partial, Classification::failure("timeout"))
            }
            Err(e) => {
                // No attempt happened; hand the task back untouched.
                state.tasks[index].status = TaskStatus::Pending;
                self.store.save(&state).await?;
                return Err(e.into());
            }
        };

        let verdict = if verdict.success {
            self.verify(&state.tasks[index]).await
        } else {
            verdict
        };

        let attempt = Attempt {
            timestamp: started,
            prompt_level: prompt.level,
            success: verdict.success,
            error: verdict.error.clone(),
            duration_seconds: output.duration_seconds,
            output_excerpt: excerpt(&output.output, self.config.output_excerpt_chars),
        };
        state.total_attempts += 1;

        let (outcome, notifications) = if verdict.success {
            self.record_success(&mut state, index, attempt, &output)
        } else {
            self.record_failure(&mut state, index, attempt)
        };

        self.store.save(&state).await?;

        for notification in notifications {
            self.notifier.notify(notification).await;
        }

        Ok(outcome)
    }

    /// Run cycles until one makes no further progress or `max_cycles` is hit.
    ///
    /// Returns the outcome of the last cycle run.
    pub async fn run(&self, max_cycles: usize) -> Result<Option<CycleOutcome>> {
        let mut last = None;
        for cycle in 1..=max_cycles {
            debug!(cycle, "Running cycle");
            let outcome = self.run_cycle().await?;
            let more = outcome.should_continue();
            last = Some(outcome);
            if !more {
                break;
            }
        }
        Ok(last)
    }

    /// Pause a running pipeline over an error only an operator can fix.
    ///
    /// Returns whether the pipeline was running and is now paused.
    pub async fn halt(&self, reason: impl Into<String>) -> Result<bool> {
        let mut state = self.store.load().await?;
        if state.global_status != GlobalStatus::Running {
            return Ok(false);
        }

        let reason = reason.into();
        let mut notification = Notification::critical("Pipeline paused").with_field("reason", reason.clone());
        if let Some(task) = state.current_task() {
            notification = notification.with_field("task", task.id.to_string());
        }
        warn!(reason = %reason, "Halting pipeline");
        state.pause(reason);
        self.store.save(&state).await?;

        self.notifier.notify(notification).await;
        Ok(true)
    }

    async fn verify(&self, task: &Task) -> Classification {
        let Some(script) = task.verification_script.as_deref() else {
            return Classification::success();
        };

        let outcome = self.verifier.verify(script, self.config.verification_timeout).await;
        if outcome.passed {
            debug!(task_id = %task.id, "Verification passed");
            Classification::success()
        } else {
            warn!(task_id = %task.id, summary = %outcome.summary(), "Verification failed");
            Classification::failure(format!("verification failed: {}", outcome.summary()))
        }
    }

    fn record_success(
        &self,
        state: &mut RunState,
        index: usize,
        attempt: Attempt,
        output: &InvocationOutput,
    ) -> (CycleOutcome, Vec<Notification>) {
        let task = &mut state.tasks[index];
        task.record_success(attempt);
        let task_id = task.id.clone();
        let title = task.title.clone();

        let pipeline_completed = state.advance();
        let counts = state.counts();
        info!(task_id = %task_id, pipeline_completed, "Task completed");

        let mut notifications = vec![Notification::info("Task complete")
            .with_field("task", task_id.to_string())
            .with_field("title", title)
            .with_field("duration", format!("{:.1}s", output.duration_seconds))
            .with_field("progress", format!("{}/{}", counts.completed, state.tasks.len()))];
        if pipeline_completed {
            notifications.push(
                Notification::info("Pipeline complete")
                    .with_field("tasks", state.tasks.len().to_string())
                    .with_field("attempts", state.total_attempts.to_string()),
            );
        }

        (
            CycleOutcome::Completed {
                task_id,
                pipeline_completed,
            },
            notifications,
        )
    }

    fn record_failure(
        &self,
        state: &mut RunState,
        index: usize,
        attempt: Attempt,
    ) -> (CycleOutcome, Vec<Notification>) {
        let error = attempt.error.clone().unwrap_or_else(|| "unknown error".to_string());
        let max_retries = self.config.max_retries;
        let task = &mut state.tasks[index];
        let task_id = task.id.clone();

        match task.record_failure(attempt, max_retries) {
            FailureDisposition::Retry { retry_count } => {
                warn!(task_id = %task_id, retry_count, error = %error, "Attempt failed, will retry");
                let notification = Notification::warning("Task failed")
                    .with_field("task", task_id.to_string())
                    .with_field("title", task.title.clone())
                    .with_field("attempt", format!("{}/{}", retry_count, max_retries + 1))
                    .with_field("retries remaining", task.retries_remaining(max_retries).to_string())
                    .with_field("error", error.clone());
                (
                    CycleOutcome::Retrying {
                        task_id,
                        retry_count,
                        error,
                    },
                    vec![notification],
                )
            }
            FailureDisposition::Blocked { retry_count } => {
                let reason = pause_reason(task);
                let notification = Notification::critical("Pipeline paused")
                    .with_field("task", task_id.to_string())
                    .with_field("title", task.title.clone())
                    .with_field("failed attempts", retry_count.to_string())
                    .with_field("history", attempt_history(task));
                warn!(task_id = %task_id, retry_count, "Task blocked, pausing pipeline");
                state.pause(reason.clone());
                (CycleOutcome::Blocked { task_id, reason }, vec![notification])
            }
        }
    }
}

fn pause_reason(task: &Task) -> String {
    format!(
        "task {} ({}) blocked after {} failed attempts: {}",
        task.id,
        task.title,
        task.retry_count,
        task.last_error.as_deref().unwrap_or("unknown error")
    )
}

fn attempt_history(task: &Task) -> String {
    task.failed_attempts()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "{}. level {} ({:.0}s): {}",
                i + 1,
                a.prompt_level,
                a.duration_seconds,
                a.error.as_deref().unwrap_or("unknown error")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
