//! Dependency gating.

use std::collections::HashMap;

use autodev_core::{RunState, Task, TaskId};

/// Result of dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// All dependencies completed, ready to execute
    Ready,
    /// Waiting on these tasks
    Blocked(Vec<TaskId>),
}

/// A defect in a task graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// A dependency names a task that does not exist
    UnknownDependency {
        /// Dependent task
        task: TaskId,
        /// Missing dependency
        dependency: TaskId,
    },
    /// A dependency sits at or after its dependent in pipeline order, so the
    /// cursor would reach the dependent first and never get past it
    ForwardDependency {
        /// Dependent task
        task: TaskId,
        /// Dependency that comes too late
        dependency: TaskId,
    },
    /// Two tasks share an id
    DuplicateId(TaskId),
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDependency { task, dependency } => {
                write!(f, "{} depends on unknown task {}", task, dependency)
            }
            Self::ForwardDependency { task, dependency } => {
                write!(f, "{} depends on {} which runs later", task, dependency)
            }
            Self::DuplicateId(id) => write!(f, "duplicate task id {}", id),
        }
    }
}

/// Resolves task dependencies against the run state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Create a new resolver.
    pub fn new() -> Self {
        Self
    }

    /// Check whether every dependency of `task` is completed.
    ///
    /// A dependency missing from the state counts as unmet.
    pub fn check(&self, state: &RunState, task: &Task) -> Resolution {
        let unmet = state.unmet_dependencies(task);
        if unmet.is_empty() {
            Resolution::Ready
        } else {
            Resolution::Blocked(unmet)
        }
    }

    /// Validate a task list in pipeline order.
    ///
    /// Dependencies must point strictly backwards; anything else would stall
    /// the cursor on a task whose dependency can never run first.
    pub fn validate(&self, tasks: &[Task]) -> Vec<GraphIssue> {
        let mut index: HashMap<&TaskId, usize> = HashMap::new();
        let mut issues = Vec::new();

        for (i, task) in tasks.iter().enumerate() {
            if index.insert(&task.id, i).is_some() {
                issues.push(GraphIssue::DuplicateId(task.id.clone()));
            }
        }

        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.dependencies {
                match index.get(dep) {
                    None => issues.push(GraphIssue::UnknownDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }),
                    Some(&j) if j >= i => issues.push(GraphIssue::ForwardDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    }),
                    Some(_) => {}
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodev_core::{TaskGraphBuilder, TaskStatus};

    #[test]
    fn test_check_reports_unmet() {
        let mut state = TaskGraphBuilder::new().build_state("## Stage 0\n- [ ] a\n- [ ] b\n");
        let resolver = DependencyResolver::new();

        assert_eq!(
            resolver.check(&state, &state.tasks[1]),
            Resolution::Blocked(vec![TaskId::new(0, 0)])
        );

        state.tasks[0].status = TaskStatus::Completed;
        assert_eq!(resolver.check(&state, &state.tasks[1]), Resolution::Ready);
        assert_eq!(resolver.check(&state, &state.tasks[0]), Resolution::Ready);
    }

    #[test]
    fn test_parsed_graph_is_valid() {
        let tasks = TaskGraphBuilder::new()
            .parse("## Stage 0\n- [ ] a\n- [ ] b\n## Stage 1\n- [ ] c\n- [ ] d\n");
        assert!(DependencyResolver::new().validate(&tasks).is_empty());
    }

    #[test]
    fn test_validate_finds_defects() {
        let mut tasks = TaskGraphBuilder::new().parse("## Stage 0\n- [ ] a\n- [ ] b\n");
        tasks[0].dependencies = vec![TaskId::new(0, 1), TaskId::new(9, 9)];

        let issues = DependencyResolver::new().validate(&tasks);
        assert_eq!(issues.len(), 2);
        assert!(issues.contains(&GraphIssue::ForwardDependency {
            task: TaskId::new(0, 0),
            dependency: TaskId::new(0, 1),
        }));
        assert!(issues[1].to_string().contains("unknown task stage9-task9"));
    }
}
