//! Agent abstractions.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Runs the coding agent with a prompt.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Run the agent once. Exceeding `timeout` kills the process and returns
    /// [`AgentError::Timeout`](crate::AgentError::Timeout).
    async fn invoke(&self, prompt: &str, timeout: Duration) -> crate::Result<InvocationOutput>;
}

/// What the agent produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutput {
    /// Captured standard output
    pub output: String,

    /// Captured standard error
    pub error_output: String,

    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Wall-clock duration
    pub duration_seconds: f64,

    /// Log file written during the run
    pub log_path: Option<PathBuf>,
}

/// Verdict on an agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Whether the task is considered done
    pub success: bool,
    /// Failure reason
    pub error: Option<String>,
}

impl Classification {
    /// A successful verdict.
    pub fn success() -> Self {
        Self { success: true, error: None }
    }

    /// A failed verdict.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Decides success from an agent run.
///
/// Implementations must be pure functions of their inputs. The exit code is a
/// weak signal: agents often exit 0 while reporting a logical failure.
pub trait OutputClassifier: Send + Sync {
    /// Classify a finished run.
    fn classify(&self, exit_code: Option<i32>, stdout: &str, stderr: &str) -> Classification;
}
