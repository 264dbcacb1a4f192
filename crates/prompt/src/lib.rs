//! Prompt escalation for autodev.
//!
//! Each attempt at a task is rendered from one of four templates, picked by
//! how many times the task has already failed. Template variables come from a
//! typed context; a template that names an unknown variable is rejected
//! instead of rendering a blank.

#![warn(missing_docs)]

pub mod context;
pub mod template;
pub mod policy;

pub use context::{PromptContext, complexity_rating};
pub use template::PromptTemplate;
pub use policy::{PromptEscalationPolicy, RenderedPrompt};

use std::path::PathBuf;

/// Result type for prompt operations.
pub type Result<T> = std::result::Result<T, PromptError>;

/// Errors raised while building a prompt.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The template for this level cannot be read
    #[error("prompt template for level {level} missing at {path}: {source}")]
    TemplateMissing {
        /// Escalation level
        level: u8,
        /// Expected template path
        path: PathBuf,
        /// Underlying read error
        source: std::io::Error,
    },

    /// The template references a variable the context does not declare
    #[error("prompt template for level {level} references undeclared variable '{name}'")]
    UndeclaredVariable {
        /// Escalation level
        level: u8,
        /// Variable name as written in the template
        name: String,
    },
}
