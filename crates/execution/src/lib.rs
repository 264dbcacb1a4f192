//! Execution layer - the orchestrator cycle, dependency gating and task selection.

#![warn(missing_docs)]

pub mod selector;
pub mod dependency;
pub mod engine;

pub use selector::{TaskSelector, CursorSelector};
pub use dependency::{DependencyResolver, Resolution, GraphIssue};
pub use engine::{Orchestrator, OrchestratorConfig, CycleOutcome};

use autodev_agent::AgentError;
use autodev_core::TaskId;
use autodev_prompt::PromptError;
use autodev_storage::StorageError;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that end a cycle without a recorded attempt.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The task under the cursor has dependencies that are not completed
    #[error("task {task_id} has unmet dependencies: {}", format_ids(.unmet))]
    DependenciesUnmet {
        /// Task that was about to run
        task_id: TaskId,
        /// Dependencies that are not completed
        unmet: Vec<TaskId>,
    },

    /// State could not be loaded or saved
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The prompt could not be rendered
    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// The agent could not be run at all
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
}

impl OrchestratorError {
    /// Whether retrying the same cycle cannot help until someone fixes the
    /// task graph, the templates or the state file.
    pub fn is_structural(&self) -> bool {
        match self {
            Self::DependenciesUnmet { .. } | Self::Prompt(_) => true,
            Self::Storage(e) => e.is_structural(),
            Self::Agent(_) => false,
        }
    }
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter().map(TaskId::to_string).collect::<Vec<_>>().join(", ")
}
