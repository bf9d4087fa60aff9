use std::fmt;
use std::time::Duration;

use crate::domain::failure::error_classification::FailureCause;
use crate::domain::restart::restart_backoff_time_strategy::RestartBackoffTimeStrategy;

#[derive(Debug, Default, Clone, Copy)]
pub struct NoRestartBackoffTimeStrategy;

impl RestartBackoffTimeStrategy for NoRestartBackoffTimeStrategy {
    fn can_restart(&self) -> bool {
        false
    }

    fn get_backoff_time(&self) -> Duration {
        Duration::ZERO
    }

    fn notify_failure(&mut self, _cause: &FailureCause) -> bool {
        true
    }
}

impl fmt::Display for NoRestartBackoffTimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoRestartBackoffTimeStrategy")
    }
}
