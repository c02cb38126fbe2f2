//! Per-task lifecycle: `Pending -> Running -> {Completed, TimedOut, Failed}`.

use anyhow::{Result, bail};

use crate::core::types::ExecResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::TimedOut | TaskState::Failed
        )
    }

    /// Move to `next`, rejecting anything but the forward edges of the lifecycle.
    pub fn advance(self, next: TaskState) -> Result<TaskState> {
        let allowed = match self {
            TaskState::Pending => next == TaskState::Running,
            TaskState::Running => next.is_terminal(),
            TaskState::Completed | TaskState::TimedOut | TaskState::Failed => false,
        };
        if !allowed {
            bail!("illegal task transition {:?} -> {:?}", self, next);
        }
        Ok(next)
    }
}

impl From<&ExecResult> for TaskState {
    fn from(result: &ExecResult) -> Self {
        match result {
            ExecResult::Completed => TaskState::Completed,
            ExecResult::TimedOut => TaskState::TimedOut,
            ExecResult::Failed(_) => TaskState::Failed,
        }
    }
}
