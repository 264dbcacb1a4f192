//! Escalation policy: choose and render the template for an attempt.

use std::path::{Path, PathBuf};

use autodev_core::{RunState, Task, MAX_PROMPT_LEVEL};
use tokio::fs;
use tracing::debug;

use crate::{PromptContext, PromptError, PromptTemplate, Result};

/// A prompt ready to hand to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    /// Escalation level used
    pub level: u8,
    /// Fully substituted text
    pub text: String,
}

/// Picks one of four templates by retry count and renders it.
///
/// | level | tone |
/// |-------|------|
/// | 0 | first attempt |
/// | 1 | retry with the previous error |
/// | 2 | strict, full failure history |
/// | 3 | final warning |
///
/// Templates are read from `<dir>/level-<n>.md` on every call, so edits take
/// effect on the next attempt.
#[derive(Debug, Clone)]
pub struct PromptEscalationPolicy {
    templates_dir: PathBuf,
    max_retries: u32,
}

impl PromptEscalationPolicy {
    /// Use templates from `templates_dir`.
    pub fn new(templates_dir: impl AsRef<Path>, max_retries: u32) -> Self {
        Self {
            templates_dir: templates_dir.as_ref().to_path_buf(),
            max_retries,
        }
    }

    /// Path of the template for `level`.
    pub fn template_path(&self, level: u8) -> PathBuf {
        self.templates_dir.join(format!("level-{}.md", level.min(MAX_PROMPT_LEVEL)))
    }

    /// Load the template for `level`.
    pub async fn load_template(&self, level: u8) -> Result<PromptTemplate> {
        let path = self.template_path(level);
        match fs::read_to_string(&path).await {
            Ok(source) => Ok(PromptTemplate::new(level, source)),
            Err(source) => Err(PromptError::TemplateMissing { level, path, source }),
        }
    }

    /// Check that all four templates exist and only use declared variables.
    pub async fn check_templates(&self) -> Result<()> {
        for level in 0..=MAX_PROMPT_LEVEL {
            self.load_template(level).await?.validate()?;
        }
        Ok(())
    }

    /// Render the prompt for the next attempt at `task`.
    pub async fn build(&self, state: &RunState, task: &Task) -> Result<RenderedPrompt> {
        let level = task.prompt_level();
        let template = self.load_template(level).await?;
        let ctx = PromptContext::new(state, task, self.max_retries);
        let text = template.render(&ctx)?;

        debug!(task_id = %task.id, level, chars = text.len(), "Rendered prompt");
        Ok(RenderedPrompt { level, text })
    }
}
