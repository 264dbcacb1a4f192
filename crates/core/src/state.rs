//! Run state - the single durable snapshot of a pipeline.

use serde::{Deserialize, Serialize};
use crate::id::TaskId;
use crate::task::{Task, TaskStatus};
use crate::{CoreError, Time};

/// Status of the pipeline as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlobalStatus {
    /// Cycles may run
    Running,
    /// Halted on a blocked task; an operator must resume
    Paused,
    /// Every task is completed
    Completed,
}

impl std::fmt::Display for GlobalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlobalStatus::Running => write!(f, "running"),
            GlobalStatus::Paused => write!(f, "paused"),
            GlobalStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Pipeline cursor, status and every task with its history.
///
/// Tasks are ordered by stage, then by position inside the stage. Every task
/// before `current_task_index` is completed; while paused, the indexed task
/// is the one that caused the pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Pipeline status
    pub global_status: GlobalStatus,

    /// Why the pipeline paused; set whenever `global_status` is `Paused`
    pub pause_reason: Option<String>,

    /// Index of the task the orchestrator attempts next
    pub current_task_index: usize,

    /// Start of the most recent cycle that invoked the agent
    pub last_run: Option<Time>,

    /// Attempts recorded across all tasks
    pub total_attempts: u64,

    /// All tasks in execution order
    pub tasks: Vec<Task>,
}

/// Per-status task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// Pending tasks
    pub pending: usize,
    /// Running tasks
    pub running: usize,
    /// Completed tasks
    pub completed: usize,
    /// Blocked tasks
    pub blocked: usize,
}

impl RunState {
    /// Derive the initial state from a parsed task list.
    ///
    /// The cursor points at the first task that is not completed. When none
    /// remains the pipeline starts out completed with the cursor on the last task.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let (global_status, current_task_index) =
            match tasks.iter().position(|t| !t.is_completed()) {
                Some(index) => (GlobalStatus::Running, index),
                None => (GlobalStatus::Completed, tasks.len().saturating_sub(1)),
            };

        Self {
            global_status,
            pause_reason: None,
            current_task_index,
            last_run: None,
            total_attempts: 0,
            tasks,
        }
    }

    /// Task under the cursor.
    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.get(self.current_task_index)
    }

    /// Mutable task under the cursor.
    pub fn current_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.get_mut(self.current_task_index)
    }

    /// Look up a task by id.
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Look up a task by id, mutably.
    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    /// Index of a task by id.
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| &t.id == id)
    }

    /// Dependencies of `task` that are not completed yet.
    pub fn unmet_dependencies(&self, task: &Task) -> Vec<TaskId> {
        task.dependencies
            .iter()
            .filter(|dep| !self.task(dep).is_some_and(Task::is_completed))
            .cloned()
            .collect()
    }

    /// Move the cursor to the next task that is not completed.
    ///
    /// Returns `true` when nothing is left and the pipeline became completed.
    pub fn advance(&mut self) -> bool {
        let from = self.current_task_index;
        match self.tasks.iter().skip(from).position(|t| !t.is_completed()) {
            Some(offset) => {
                self.current_task_index = from + offset;
                false
            }
            None => {
                self.current_task_index = self.tasks.len().saturating_sub(1);
                self.global_status = GlobalStatus::Completed;
                self.pause_reason = None;
                true
            }
        }
    }

    /// Halt the pipeline.
    pub fn pause(&mut self, reason: impl Into<String>) {
        self.global_status = GlobalStatus::Paused;
        self.pause_reason = Some(reason.into());
    }

    /// Operator resume: set the pipeline running again.
    ///
    /// Fails while the task under the cursor is still blocked; reset it first.
    pub fn resume(&mut self) -> Result<(), CoreError> {
        match self.global_status {
            GlobalStatus::Completed => Err(CoreError::AlreadyCompleted),
            GlobalStatus::Running => Ok(()),
            GlobalStatus::Paused => {
                if let Some(task) = self.current_task() {
                    if task.status == TaskStatus::Blocked {
                        return Err(CoreError::TaskBlocked(task.id.clone()));
                    }
                }
                self.global_status = GlobalStatus::Running;
                self.pause_reason = None;
                Ok(())
            }
        }
    }

    /// Operator reset: put a blocked task back to pending with a fresh retry
    /// budget. Its attempt history is kept.
    pub fn reset_task(&mut self, id: &TaskId) -> Result<(), CoreError> {
        let task = self
            .task_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;

        match task.status {
            TaskStatus::Blocked | TaskStatus::Running => {
                task.status = TaskStatus::Pending;
                task.retry_count = 0;
                Ok(())
            }
            _ => Err(CoreError::NotBlocked(id.clone())),
        }
    }

    /// Count tasks per status.
    pub fn counts(&self) -> StatusCounts {
        self.tasks.iter().fold(StatusCounts::default(), |mut acc, t| {
            match t.status {
                TaskStatus::Pending => acc.pending += 1,
                TaskStatus::Running => acc.running += 1,
                TaskStatus::Completed => acc.completed += 1,
                TaskStatus::Blocked => acc.blocked += 1,
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(done: &[bool]) -> Vec<Task> {
        done.iter()
            .enumerate()
            .map(|(i, &d)| {
                let mut t = Task::new(0, i as u32, format!("task {}", i), "");
                if d {
                    t.status = TaskStatus::Completed;
                }
                t
            })
            .collect()
    }

    #[test]
    fn test_initial_cursor_skips_completed() {
        let state = RunState::from_tasks(tasks(&[true, false, false]));
        assert_eq!(state.global_status, GlobalStatus::Running);
        assert_eq!(state.current_task_index, 1);
    }

    #[test]
    fn test_all_completed_starts_completed() {
        let state = RunState::from_tasks(tasks(&[true, true]));
        assert_eq!(state.global_status, GlobalStatus::Completed);
        assert_eq!(state.current_task_index, 1);

        let empty = RunState::from_tasks(Vec::new());
        assert_eq!(empty.global_status, GlobalStatus::Completed);
        assert_eq!(empty.current_task_index, 0);
    }

    #[test]
    fn test_advance_until_completed() {
        let mut state = RunState::from_tasks(tasks(&[false, false]));
        state.tasks[0].status = TaskStatus::Completed;
        assert!(!state.advance());
        assert_eq!(state.current_task_index, 1);

        state.tasks[1].status = TaskStatus::Completed;
        assert!(state.advance());
        assert_eq!(state.global_status, GlobalStatus::Completed);
        assert_eq!(state.current_task_index, 1);
    }

    #[test]
    fn test_resume_requires_reset_of_blocked_task() {
        let mut state = RunState::from_tasks(tasks(&[false]));
        state.tasks[0].status = TaskStatus::Blocked;
        state.tasks[0].retry_count = 4;
        state.pause("stage0-task0 blocked");

        let id = state.tasks[0].id.clone();
        assert!(matches!(state.resume(), Err(CoreError::TaskBlocked(_))));

        state.reset_task(&id).unwrap();
        assert_eq!(state.tasks[0].retry_count, 0);
        state.resume().unwrap();
        assert_eq!(state.global_status, GlobalStatus::Running);
        assert!(state.pause_reason.is_none());
    }

    #[test]
    fn test_reset_rejects_pending_task() {
        let mut state = RunState::from_tasks(tasks(&[false]));
        let id = state.tasks[0].id.clone();
        assert!(matches!(state.reset_task(&id), Err(CoreError::NotBlocked(_))));
    }

    #[test]
    fn test_unmet_dependencies() {
        let mut list = tasks(&[true, false, false]);
        list[2].dependencies = vec![list[0].id.clone(), list[1].id.clone()];
        let state = RunState::from_tasks(list);

        let unmet = state.unmet_dependencies(&state.tasks[2]);
        assert_eq!(unmet, vec![TaskId::new(0, 1)]);
    }

    #[test]
    fn test_serialized_status_is_lowercase() {
        let mut state = RunState::from_tasks(tasks(&[false]));
        state.pause("halt");
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["global_status"], "paused");
        assert_eq!(json["tasks"][0]["status"], "pending");
    }
}
