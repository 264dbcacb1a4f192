//! autodev CLI - drives a task list through a coding agent.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use autodev_agent::{CommandInvoker, MarkerClassifier, ScriptVerifier};
use autodev_core::{RunState, TaskGraphBuilder, TaskId, TaskStatus};
use autodev_execution::{CycleOutcome, DependencyResolver, Orchestrator};
use autodev_notify::{LogSink, NotificationSink, Notifier, WebhookSink};
use autodev_prompt::PromptEscalationPolicy;
use autodev_queue::{JobQueue, Worker};
use autodev_storage::{ArtifactStore, JsonStateStore, StateStore};

use crate::config::AutodevConfig;

#[derive(Parser)]
#[command(name = "autodev")]
#[command(about = "Autonomous task pipeline for a coding agent", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "autodev.toml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the task list and write the initial state
    Init {
        /// Task list (defaults to paths.task_file)
        #[arg(long)]
        tasks: Option<PathBuf>,
        /// Overwrite an existing state
        #[arg(long)]
        force: bool,
    },
    /// Show pipeline status
    Status {
        /// Print the raw state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run orchestrator cycles in the foreground
    Run {
        /// Maximum number of cycles
        #[arg(long, default_value = "1")]
        cycles: usize,
    },
    /// Run the queue worker until interrupted
    Worker,
    /// Resume a paused pipeline
    Resume,
    /// Put a blocked task back to pending
    Reset {
        /// Task ID (stage<N>-task<K>)
        id: String,
        /// Resume the pipeline afterwards
        #[arg(long)]
        resume: bool,
    },
    /// Attach a verification script to a task
    SetVerify {
        /// Task ID (stage<N>-task<K>)
        id: String,
        /// Shell script run after the agent reports success
        script: Option<String>,
        /// Remove the script instead
        #[arg(long, conflicts_with = "script")]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = AutodevConfig::load(&cli.config).await?;
    let store = JsonStateStore::new(&config.paths.state_dir).await?;

    match cli.command {
        Commands::Init { tasks, force } => {
            let task_file = tasks.unwrap_or_else(|| config.paths.task_file.clone());
            init(&config, &store, &task_file, force).await?;
        }
        Commands::Status { json } => {
            let state = store.load().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_status(&state);
            }
        }
        Commands::Run { cycles } => {
            let orchestrator = build_orchestrator(&config, store)?;
            match orchestrator.run(cycles).await? {
                Some(outcome) => println!("{}", describe(&outcome)),
                None => println!("No cycles run"),
            }
            print_status(&orchestrator.state().await?);
        }
        Commands::Worker => {
            let orchestrator = Arc::new(build_orchestrator(&config, store)?);
            let queue = JobQueue::open(
                config.queue_config(),
                config.paths.state_dir.join("jobs.json"),
            )
            .await?;
            let worker = Worker::new(Arc::new(queue), orchestrator.clone(), orchestrator)
                .with_config(config.worker_config());

            worker
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for ctrl-c");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
        Commands::Resume => {
            let mut state = store.load().await?;
            state.resume()?;
            store.save(&state).await?;
            println!("Pipeline {}", state.global_status);
        }
        Commands::Reset { id, resume } => {
            let id: TaskId = id.parse()?;
            let mut state = store.load().await?;
            state.reset_task(&id)?;
            if resume {
                state.resume()?;
            }
            store.save(&state).await?;
            info!(task_id = %id, resumed = resume, "Task reset");
            println!("Reset {} (pipeline {})", id, state.global_status);
        }
        Commands::SetVerify { id, script, clear } => {
            let id: TaskId = id.parse()?;
            if script.is_none() && !clear {
                bail!("give a script or --clear");
            }
            let mut state = store.load().await?;
            let task = state
                .task_mut(&id)
                .with_context(|| format!("task {} not found", id))?;
            task.verification_script = script.filter(|_| !clear);
            store.save(&state).await?;
            println!("Verification for {} updated", id);
        }
    }

    Ok(())
}

async fn init(config: &AutodevConfig, store: &JsonStateStore, task_file: &Path, force: bool) -> Result<()> {
    if store.exists().await? && !force {
        bail!(
            "state already exists at {}; use --force to overwrite",
            store.state_path().display()
        );
    }

    let text = tokio::fs::read_to_string(task_file)
        .await
        .with_context(|| format!("failed to read task list {}", task_file.display()))?;

    let builder = TaskGraphBuilder::new();
    let tasks = builder.parse(&text);
    if tasks.is_empty() {
        bail!("no tasks found in {}", task_file.display());
    }
    let issues = DependencyResolver::new().validate(&tasks);
    if !issues.is_empty() {
        let lines: Vec<String> = issues.iter().map(|i| format!("  - {}", i)).collect();
        bail!("task graph is invalid:\n{}", lines.join("\n"));
    }

    PromptEscalationPolicy::new(&config.paths.prompts_dir, config.orchestrator.max_retries)
        .check_templates()
        .await?;

    let state = RunState::from_tasks(tasks);
    store.save(&state).await?;
    info!(tasks = state.tasks.len(), path = %store.state_path().display(), "State initialized");
    print_status(&state);
    Ok(())
}

fn build_orchestrator(config: &AutodevConfig, store: JsonStateStore) -> Result<Orchestrator> {
    let artifacts = ArtifactStore::new(&config.paths.state_dir);

    let mut invoker = CommandInvoker::new(&config.agent.command, artifacts.logs_dir())
        .with_args(config.agent.args.iter().cloned());
    let mut verifier = ScriptVerifier::new();
    if let Some(dir) = &config.agent.working_dir {
        invoker = invoker.with_working_dir(dir);
        verifier = verifier.with_working_dir(dir);
    }

    let notifier = if config.notification.enabled {
        let sink: Arc<dyn NotificationSink> = match &config.notification.webhook_url {
            Some(url) => Arc::new(WebhookSink::new(url.clone())?),
            None => Arc::new(LogSink),
        };
        Notifier::new(sink, config.notification.target.clone())
    } else {
        Notifier::disabled()
    };

    Ok(Orchestrator::new(
        Arc::new(store),
        PromptEscalationPolicy::new(&config.paths.prompts_dir, config.orchestrator.max_retries),
        Arc::new(invoker),
    )
    .with_classifier(Arc::new(MarkerClassifier::new(
        config.classifier.success_markers.clone(),
        config.classifier.failure_markers.clone(),
    )))
    .with_verifier(verifier)
    .with_notifier(notifier)
    .with_artifacts(artifacts)
    .with_config(config.orchestrator_config()))
}

fn describe(outcome: &CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Idle { status, reason: Some(reason) } => format!("Pipeline {}: {}", status, reason),
        CycleOutcome::Idle { status, .. } => format!("Pipeline {}", status),
        CycleOutcome::NoTask => "No task to run".to_string(),
        CycleOutcome::Completed { task_id, pipeline_completed: true } => {
            format!("{} completed; pipeline completed", task_id)
        }
        CycleOutcome::Completed { task_id, .. } => format!("{} completed", task_id),
        CycleOutcome::Retrying { task_id, retry_count, error } => {
            format!("{} failed (retry {}): {}", task_id, retry_count, error)
        }
        CycleOutcome::Blocked { task_id, reason } => format!("{} blocked: {}", task_id, reason),
    }
}

fn print_status(state: &RunState) {
    let counts = state.counts();
    println!("Pipeline: {}", state.global_status);
    if let Some(reason) = &state.pause_reason {
        println!("Paused: {}", reason);
    }
    if let Some(task) = state.current_task() {
        println!("Current: {} - {}", task.id, task.title);
    }
    println!(
        "Tasks: {} total, {} completed, {} pending, {} running, {} blocked",
        state.tasks.len(),
        counts.completed,
        counts.pending,
        counts.running,
        counts.blocked
    );
    println!("Attempts: {}", state.total_attempts);
    if let Some(last) = state.last_run {
        println!("Last run: {}", last.to_rfc3339());
    }

    println!();
    for (i, task) in state.tasks.iter().enumerate() {
        let marker = if i == state.current_task_index { ">" } else { " " };
        let status = match task.status {
            TaskStatus::Pending if task.retry_count > 0 => format!("pending (retry {})", task.retry_count),
            status => format!("{:?}", status).to_lowercase(),
        };
        println!("{} {:<16} {:<20} {}", marker, task.id.to_string(), status, task.title);
        if let Some(error) = task.last_error.as_ref().filter(|_| task.status != TaskStatus::Completed) {
            println!("    last error: {}", error);
        }
    }
}
