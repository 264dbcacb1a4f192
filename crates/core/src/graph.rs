//! Task graph construction from a markdown task list.
//!
//! Two line shapes are recognised:
//!
//! ```text
//! ## Stage 1: Setup
//! - [x] init repo
//! - [ ] add CI: run tests on every push
//! ```
//!
//! Everything else is ignored. Dependencies follow the document structure:
//! the first task of a stage depends on every task of the previous stage,
//! later tasks depend on the task right before them.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use tracing::debug;

use crate::id::TaskId;
use crate::state::RunState;
use crate::task::{Task, TaskStatus};

static STAGE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{1,6}\s*stage\s+(\d+)").expect("stage heading pattern is valid")
});

static CHECKBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*+]\s+\[([ xX])\]\s+(.+?)\s*$").expect("checkbox pattern is valid")
});

/// Builds the ordered task list and its dependency graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskGraphBuilder;

/// Tasks of one stage in document order.
struct StageBlock {
    stage: u32,
    task_ids: Vec<TaskId>,
}

impl TaskGraphBuilder {
    /// Create a builder.
    pub fn new() -> Self {
        Self
    }

    /// Parse the task list into tasks, in document order.
    pub fn parse(&self, text: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut stages: Vec<StageBlock> = Vec::new();
        let mut current_stage: Option<u32> = None;

        for (line_no, line) in text.lines().enumerate() {
            if let Some(caps) = STAGE_HEADING.captures(line) {
                match caps[1].parse::<u32>() {
                    Ok(stage) => current_stage = Some(stage),
                    Err(_) => debug!(line = line_no + 1, "Stage number out of range, ignoring heading"),
                }
                continue;
            }

            let Some(caps) = CHECKBOX.captures(line) else {
                continue;
            };
            let Some(stage) = current_stage else {
                debug!(line = line_no + 1, "Checkbox before any stage heading, ignoring");
                continue;
            };

            let checked = !caps[1].trim().is_empty();
            let (title, description) = split_text(&caps[2]);

            let prior = stages
                .iter()
                .rev()
                .find(|b| b.stage != stage && !b.task_ids.is_empty())
                .map(|b| b.task_ids.clone())
                .unwrap_or_default();

            let block_index = match stages.iter().position(|b| b.stage == stage) {
                Some(index) => index,
                None => {
                    stages.push(StageBlock { stage, task_ids: Vec::new() });
                    stages.len() - 1
                }
            };

            let mut block = stages.remove(block_index);
            let sequence = block.task_ids.len() as u32;
            let mut task = Task::new(stage, sequence, title, description);
            task.dependencies = match block.task_ids.last() {
                Some(previous) => vec![previous.clone()],
                None => prior,
            };
            if checked {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
            }

            block.task_ids.push(task.id.clone());
            // The most recently extended stage goes last, so the lookup of the
            // previous stage follows document order.
            stages.push(block);
            tasks.push(task);
        }

        tasks
    }

    /// Parse the task list and derive the initial run state.
    pub fn build_state(&self, text: &str) -> RunState {
        RunState::from_tasks(self.parse(text))
    }
}

/// `Title: description` splits on the first `": "`; otherwise both are the full text.
fn split_text(text: &str) -> (String, String) {
    match text.split_once(": ") {
        Some((title, description)) if !title.trim().is_empty() && !description.trim().is_empty() => {
            (title.trim().to_string(), description.trim().to_string())
        }
        _ => (text.to_string(), text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GlobalStatus;

    #[test]
    fn test_single_stage() {
        let tasks = TaskGraphBuilder::new().parse("## Stage 1: Setup\n- [x] init repo\n- [ ] add CI");

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id.as_str(), "stage1-task0");
        assert_eq!(tasks[0].status, TaskStatus::Completed);
        assert!(tasks[0].completed_at.is_some());
        assert!(tasks[0].dependencies.is_empty());

        assert_eq!(tasks[1].id.as_str(), "stage1-task1");
        assert_eq!(tasks[1].status, TaskStatus::Pending);
        assert_eq!(tasks[1].dependencies, vec![TaskId::new(1, 0)]);
    }

    #[test]
    fn test_repeated_stage_heading_continues_numbering() {
        let tasks = TaskGraphBuilder::new().parse("## Stage 1\n- [ ] a\n## Stage 2\n- [ ] b\n## Stage 1\n- [ ] c\n");

        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[1].id.as_str(), "stage2-task0");
        assert_eq!(tasks[1].dependencies, vec![TaskId::new(1, 0)]);
        assert_eq!(tasks[2].id.as_str(), "stage1-task1");
        assert_eq!(tasks[2].sequence, 1);
        assert_eq!(tasks[2].dependencies, vec![TaskId::new(1, 0)]);
    }

    #[test]
    fn test_first_task_depends_on_whole_prior_stage() {
        let text = "\
# Plan

## Stage 0: Bootstrap
- [ ] a
- [ ] b
- [ ] c

Some prose that is not a task.

## Stage 1: Build
- [ ] d
  - [ ] nested e
";
        let tasks = TaskGraphBuilder::new().parse(text);
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str().to_string()).collect();
        assert_eq!(
            ids,
            vec!["stage0-task0", "stage0-task1", "stage0-task2", "stage1-task0", "stage1-task1"]
        );

        assert_eq!(
            tasks[3].dependencies,
            vec![TaskId::new(0, 0), TaskId::new(0, 1), TaskId::new(0, 2)]
        );
        assert_eq!(tasks[4].dependencies, vec![TaskId::new(1, 0)]);
    }

    #[test]
    fn test_empty_stage_is_skipped_for_dependencies() {
        let text = "## Stage 1\n- [ ] a\n## Stage 2\n## Stage 3\n- [ ] b\n";
        let tasks = TaskGraphBuilder::new().parse(text);
        assert_eq!(tasks[1].id.as_str(), "stage3-task0");
        assert_eq!(tasks[1].dependencies, vec![TaskId::new(1, 0)]);
    }

    #[test]
    fn test_lines_before_heading_are_ignored() {
        let tasks = TaskGraphBuilder::new().parse("- [ ] orphan\n## Stage 2\n- [X] kept");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.as_str(), "stage2-task0");
        assert!(tasks[0].is_completed());
    }

    #[test]
    fn test_title_description_split() {
        let tasks = TaskGraphBuilder::new().parse("## Stage 1\n- [ ] Add CI: run tests on push\n- [ ] plain");
        assert_eq!(tasks[0].title, "Add CI");
        assert_eq!(tasks[0].description, "run tests on push");
        assert_eq!(tasks[1].title, "plain");
        assert_eq!(tasks[1].description, "plain");
    }

    #[test]
    fn test_parse_is_deterministic() {
        let text = "## Stage 1\n- [ ] a\n- [ ] b\n## Stage 2\n- [ ] c\n";
        let builder = TaskGraphBuilder::new();
        let first: Vec<_> = builder.parse(text).into_iter().map(|t| (t.id, t.dependencies)).collect();
        let second: Vec<_> = builder.parse(text).into_iter().map(|t| (t.id, t.dependencies)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_build_state_points_at_first_pending() {
        let state = TaskGraphBuilder::new().build_state("## Stage 1\n- [x] a\n- [ ] b\n");
        assert_eq!(state.global_status, GlobalStatus::Running);
        assert_eq!(state.current_task_index, 1);

        let done = TaskGraphBuilder::new().build_state("## Stage 1\n- [x] a\n- [x] b\n");
        assert_eq!(done.global_status, GlobalStatus::Completed);
        assert_eq!(done.current_task_index, 1);
    }
}
