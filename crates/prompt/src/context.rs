//! Typed template context.

use autodev_core::{RunState, Task};

/// Rendered in place of an optional value that is absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// Rendered in place of an empty list.
pub const NONE: &str = "none";

/// Every value a prompt template may reference, one field per variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    /// 1-based position in the pipeline, e.g. `3/12`
    pub position: String,
    /// Stage number
    pub stage: u32,
    /// Task id
    pub task_id: String,
    /// Task title
    pub task_title: String,
    /// Task description, or `N/A`
    pub task_description: String,
    /// One line per dependency with ✅/❌ and its title, or `none`
    pub dependency_status: String,
    /// Failed attempts so far
    pub retry_count: u32,
    /// Retries left before the task is blocked
    pub retries_remaining: u32,
    /// Escalation level of this attempt
    pub prompt_level: u8,
    /// Error of the latest failed attempt, or `N/A`
    pub last_error: String,
    /// Errors of every earlier failed attempt, or `none`
    pub error_history: String,
    /// Heuristic complexity rating, 1-5
    pub complexity: u8,
}

impl PromptContext {
    /// Variable names templates may use.
    pub const VARIABLES: &'static [&'static str] = &[
        "position",
        "stage",
        "task_id",
        "task_title",
        "task_description",
        "dependency_status",
        "retry_count",
        "retries_remaining",
        "prompt_level",
        "last_error",
        "error_history",
        "complexity",
    ];

    /// Build the context for `task` as it sits in `state`.
    pub fn new(state: &RunState, task: &Task, max_retries: u32) -> Self {
        let index = state.position(&task.id).unwrap_or(state.current_task_index);

        let dependency_status = if task.dependencies.is_empty() {
            NONE.to_string()
        } else {
            task.dependencies
                .iter()
                .map(|dep| match state.task(dep) {
                    Some(t) if t.is_completed() => format!("✅ {}: {}", dep, t.title),
                    Some(t) => format!("❌ {}: {} ({})", dep, t.title, t.status),
                    None => format!("❌ {}: unknown task", dep),
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let history: Vec<String> = task
            .failed_attempts()
            .enumerate()
            .map(|(i, a)| {
                format!(
                    "Attempt {} (level {}, {}): {}",
                    i + 1,
                    a.prompt_level,
                    a.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                    a.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();

        Self {
            position: format!("{}/{}", index + 1, state.tasks.len()),
            stage: task.stage,
            task_id: task.id.to_string(),
            task_title: task.title.clone(),
            task_description: non_empty(&task.description),
            dependency_status,
            retry_count: task.retry_count,
            retries_remaining: task.retries_remaining(max_retries),
            prompt_level: task.prompt_level(),
            last_error: task
                .last_error
                .as_deref()
                .map(non_empty)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            error_history: if history.is_empty() {
                NONE.to_string()
            } else {
                history.join("\n")
            },
            complexity: complexity_rating(&task.title, task.stage),
        }
    }

    /// Value of a declared variable, `None` for anything undeclared.
    pub fn value(&self, name: &str) -> Option<String> {
        let value = match name {
            "position" => self.position.clone(),
            "stage" => self.stage.to_string(),
            "task_id" => self.task_id.clone(),
            "task_title" => self.task_title.clone(),
            "task_description" => self.task_description.clone(),
            "dependency_status" => self.dependency_status.clone(),
            "retry_count" => self.retry_count.to_string(),
            "retries_remaining" => self.retries_remaining.to_string(),
            "prompt_level" => self.prompt_level.to_string(),
            "last_error" => self.last_error.clone(),
            "error_history" => self.error_history.clone(),
            "complexity" => self.complexity.to_string(),
            _ => return None,
        };
        Some(value)
    }
}

fn non_empty(s: &str) -> String {
    if s.trim().is_empty() {
        NOT_AVAILABLE.to_string()
    } else {
        s.to_string()
    }
}

/// Rate a task 1-5 from keywords in its title.
///
/// Rules, first match wins: test/confirm words → 1, "create" with "simple" → 2,
/// "implement" in stages 0-2 → 3, "integrate" or "API" → 4, otherwise 3.
pub fn complexity_rating(title: &str, stage: u32) -> u8 {
    let lower = title.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |prefix: &str| words.iter().any(|w| w.starts_with(prefix));

    if has("test") || has("confirm") {
        1
    } else if has("create") && has("simple") {
        2
    } else if has("implement") && stage <= 2 {
        3
    } else if has("integrat") || words.iter().any(|w| *w == "api" || *w == "apis") {
        4
    } else {
        3
    }
}
