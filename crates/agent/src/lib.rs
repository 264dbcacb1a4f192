//! Coding agent integration.
//!
//! Runs the external agent as a subprocess with a hard timeout, keeps a log
//! file per invocation, and turns the captured output into a success or
//! failure verdict.

#![warn(missing_docs)]

pub mod r#trait;
pub mod invoker;
pub mod classifier;
pub mod verify;

pub use r#trait::{AgentInvoker, InvocationOutput, OutputClassifier, Classification};
pub use invoker::CommandInvoker;
pub use classifier::MarkerClassifier;
pub use verify::{ScriptVerifier, VerificationOutcome};

use std::path::PathBuf;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised while running the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The agent ran past its timeout and was killed
    #[error("agent timed out after {elapsed_seconds:.1}s (log: {})", .log_path.display())]
    Timeout {
        /// Seconds elapsed before the kill
        elapsed_seconds: f64,
        /// Invocation log file
        log_path: PathBuf,
        /// Output captured before the kill
        partial: Box<InvocationOutput>,
    },

    /// The agent process could not be started
    #[error("failed to start agent '{program}': {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// I/O error while talking to the process or writing the log
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Last `max_chars` characters of `text`, prefixed with `...` when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let start = text
        .char_indices()
        .nth(total - max_chars)
        .map_or(0, |(i, _)| i);
    format!("...{}", &text[start..])
}
