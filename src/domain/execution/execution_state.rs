use serde::Serialize;
use std::fmt;

use crate::domain::failure::error_classification::FailureCause;
use crate::domain::utils::id::ExecutionAttemptId;

/// State of one execution attempt of a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    Created,
    Scheduled,
    Deploying,
    Initializing,
    Running,
    Finished,
    Canceling,
    Canceled,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Finished | ExecutionState::Canceled | ExecutionState::Failed)
    }

    /// The attempt occupies a task slot on a task manager.
    pub fn is_deployed(&self) -> bool {
        matches!(self, ExecutionState::Deploying | ExecutionState::Initializing | ExecutionState::Running | ExecutionState::Canceling)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_uppercase())
    }
}

/// Status report of an execution attempt, as sent by the task manager running it.
#[derive(Debug, Clone)]
pub struct TaskExecutionStateTransition {
    pub attempt_id: ExecutionAttemptId,
    pub execution_state: ExecutionState,
    pub error: Option<FailureCause>,
}

impl TaskExecutionStateTransition {
    pub fn new(attempt_id: ExecutionAttemptId, execution_state: ExecutionState) -> Self {
        TaskExecutionStateTransition { attempt_id, execution_state, error: None }
    }

    pub fn failed(attempt_id: ExecutionAttemptId, error: FailureCause) -> Self {
        TaskExecutionStateTransition { attempt_id, execution_state: ExecutionState::Failed, error: Some(error) }
    }
}
