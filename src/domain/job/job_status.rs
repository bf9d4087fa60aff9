use serde::Serialize;
use std::fmt;

/// Externally visible status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Initializing,
    Created,
    Running,
    Failing,
    Failed,
    Cancelling,
    Canceled,
    Finished,
    Restarting,
    Suspended,
}

impl JobStatus {
    /// Failed, canceled and finished jobs never run again anywhere in the cluster.
    pub fn is_globally_terminal_state(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Canceled | JobStatus::Finished)
    }

    /// Terminal for this scheduler. A suspended job may be picked up elsewhere.
    pub fn is_terminal_state(&self) -> bool {
        self.is_globally_terminal_state() || matches!(self, JobStatus::Suspended)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Initializing => "INITIALIZING",
            JobStatus::Created => "CREATED",
            JobStatus::Running => "RUNNING",
            JobStatus::Failing => "FAILING",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelling => "CANCELLING",
            JobStatus::Canceled => "CANCELED",
            JobStatus::Finished => "FINISHED",
            JobStatus::Restarting => "RESTARTING",
            JobStatus::Suspended => "SUSPENDED",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspended_is_terminal_but_not_globally() {
        assert!(JobStatus::Suspended.is_terminal_state());
        assert!(!JobStatus::Suspended.is_globally_terminal_state());
        assert!(JobStatus::Canceled.is_globally_terminal_state());
        assert!(!JobStatus::Restarting.is_terminal_state());
    }
}
