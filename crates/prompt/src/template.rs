//! Prompt templates with `{{variable}}` placeholders.

use std::sync::LazyLock;

use regex::Regex;

use crate::{PromptContext, PromptError, Result};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// A prompt template for one escalation level.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    level: u8,
    source: String,
}

impl PromptTemplate {
    /// Wrap template text for `level`.
    pub fn new(level: u8, source: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
        }
    }

    /// Escalation level this template belongs to.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Variable names referenced by the template, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        PLACEHOLDER
            .captures_iter(&self.source)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Check that every placeholder is declared by [`PromptContext`].
    pub fn validate(&self) -> Result<()> {
        match self
            .variables()
            .into_iter()
            .find(|name| !PromptContext::VARIABLES.contains(name))
        {
            Some(name) => Err(PromptError::UndeclaredVariable {
                level: self.level,
                name: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Substitute every placeholder in one pass.
    ///
    /// Values are inserted verbatim; a value that itself looks like a
    /// placeholder is not expanded again.
    pub fn render(&self, ctx: &PromptContext) -> Result<String> {
        self.validate()?;

        let rendered = PLACEHOLDER.replace_all(&self.source, |caps: &regex::Captures<'_>| {
            ctx.value(&caps[1]).unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodev_core::{TaskGraphBuilder, MAX_RETRIES};

    fn context() -> PromptContext {
        let state = TaskGraphBuilder::new().build_state("## Stage 2\n- [ ] Write docs: cover {{stage}} usage\n");
        PromptContext::new(&state, &state.tasks[0], MAX_RETRIES)
    }

    #[test]
    fn test_render_substitutes_exact_names() {
        let template = PromptTemplate::new(0, "[{{ task_id }}] {{task_title}} / {{task_title_extra}}");
        let err = template.render(&context()).unwrap_err();
        assert!(matches!(
            err,
            PromptError::UndeclaredVariable { level: 0, ref name } if name == "task_title_extra"
        ));

        let template = PromptTemplate::new(1, "[{{ task_id }}] {{task_title}} at stage {{stage}}");
        assert_eq!(template.render(&context()).unwrap(), "[stage2-task0] Write docs at stage 2");
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let template = PromptTemplate::new(0, "{{task_description}}");
        assert_eq!(template.render(&context()).unwrap(), "cover {{stage}} usage");
    }

    #[test]
    fn test_variables_lists_placeholders() {
        let template = PromptTemplate::new(3, "{{position}} {{ last_error }} {{position}}");
        assert_eq!(template.variables(), vec!["position", "last_error", "position"]);
        assert_eq!(template.level(), 3);
    }
}
