//! Next-runnable task selection.

use autodev_core::{GlobalStatus, RunState, Task, TaskStatus};

use crate::{DependencyResolver, Resolution};

/// Strategy for picking the task the next cycle should run.
pub trait TaskSelector: Send + Sync {
    /// The next runnable task, if any.
    fn select<'a>(&self, state: &'a RunState) -> Option<&'a Task>;
}

/// Picks the task under the cursor when the pipeline is running and the task
/// can be attempted.
///
/// This mirrors what [`Orchestrator::run_cycle`](crate::Orchestrator::run_cycle)
/// will act on, so a scheduler that enqueues the selected task never queues
/// work the cycle would refuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorSelector {
    resolver: DependencyResolver,
}

impl CursorSelector {
    /// Create a new selector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskSelector for CursorSelector {
    fn select<'a>(&self, state: &'a RunState) -> Option<&'a Task> {
        if state.global_status != GlobalStatus::Running {
            return None;
        }

        let task = state.current_task()?;
        if !matches!(task.status, TaskStatus::Pending | TaskStatus::Running) {
            return None;
        }

        match self.resolver.check(state, task) {
            Resolution::Ready => Some(task),
            Resolution::Blocked(_) => None,
        }
    }
}
