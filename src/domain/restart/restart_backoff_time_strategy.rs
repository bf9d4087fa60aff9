use std::fmt;
use std::time::Duration;

use crate::domain::failure::error_classification::FailureCause;

/// Decides whether and when a failed job may run again.
pub trait RestartBackoffTimeStrategy: fmt::Display + Send {
    fn can_restart(&self) -> bool;

    /// Delay before the next attempt. Only meaningful if `can_restart` holds.
    fn get_backoff_time(&self) -> Duration;

    /// Records a failure. Returns `true` if it counted as a new attempt.
    fn notify_failure(&mut self, cause: &FailureCause) -> bool;
}
