use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum CheckpointFailureReason {
    BlockingOutputExist,
    TriggerCheckpointFailure,
    NotAllRequiredTasksRunning,
    CheckpointDeclined,
    CheckpointCoordinatorShutdown,
    CheckpointCoordinatorSuspend,
    JobFailover,
    FinalizeCheckpointFailure,
}

impl CheckpointFailureReason {
    pub fn message(&self) -> &'static str {
        match self {
            CheckpointFailureReason::BlockingOutputExist => "Blocking output edge exists in running tasks.",
            CheckpointFailureReason::TriggerCheckpointFailure => "Trigger checkpoint failure.",
            CheckpointFailureReason::NotAllRequiredTasksRunning => "Not all required tasks are currently running.",
            CheckpointFailureReason::CheckpointDeclined => "Checkpoint was declined.",
            CheckpointFailureReason::CheckpointCoordinatorShutdown => "CheckpointCoordinator shutdown.",
            CheckpointFailureReason::CheckpointCoordinatorSuspend => "Checkpoint Coordinator is suspending.",
            CheckpointFailureReason::JobFailover => "The job has failed.",
            CheckpointFailureReason::FinalizeCheckpointFailure => "Failure to finalize checkpoint.",
        }
    }
}

impl fmt::Display for CheckpointFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{}", self.describe())]
pub struct CheckpointException {
    pub reason: CheckpointFailureReason,
    pub detail: Option<String>,
}

impl CheckpointException {
    pub fn new(reason: CheckpointFailureReason) -> Self {
        CheckpointException { reason, detail: None }
    }

    pub fn with_detail(detail: impl Into<String>, reason: CheckpointFailureReason) -> Self {
        CheckpointException { reason, detail: Some(detail.into()) }
    }

    fn describe(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} Failure reason: {}", detail, self.reason),
            None => self.reason.to_string(),
        }
    }
}
