use std::time::Duration;

use crate::domain::failure::error_classification::FailureCause;

/// Outcome of classifying a failure.
#[derive(Debug, Clone)]
pub enum FailureResult {
    /// The job may run again once `backoff_time` passed.
    CanRestart { cause: FailureCause, timestamp: i64, backoff_time: Duration },
    /// The job has to fail. `reason` explains why no restart happens.
    CanNotRestart { cause: FailureCause, timestamp: i64, reason: String },
}

impl FailureResult {
    pub fn can_restart(cause: FailureCause, timestamp: i64, backoff_time: Duration) -> Self {
        FailureResult::CanRestart { cause, timestamp, backoff_time }
    }

    pub fn can_not_restart(cause: FailureCause, timestamp: i64, reason: impl Into<String>) -> Self {
        FailureResult::CanNotRestart { cause, timestamp, reason: reason.into() }
    }

    pub fn is_restartable(&self) -> bool {
        matches!(self, FailureResult::CanRestart { .. })
    }

    pub fn backoff_time(&self) -> Option<Duration> {
        match self {
            FailureResult::CanRestart { backoff_time, .. } => Some(*backoff_time),
            FailureResult::CanNotRestart { .. } => None,
        }
    }

    pub fn cause(&self) -> &FailureCause {
        match self {
            FailureResult::CanRestart { cause, .. } | FailureResult::CanNotRestart { cause, .. } => cause,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            FailureResult::CanRestart { timestamp, .. } | FailureResult::CanNotRestart { timestamp, .. } => *timestamp,
        }
    }
}
