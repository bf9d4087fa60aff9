use std::fmt;
use std::time::Duration;

use crate::domain::failure::error_classification::FailureCause;
use crate::domain::restart::restart_backoff_time_strategy::RestartBackoffTimeStrategy;

/// Restarts a fixed number of times with a constant delay.
#[derive(Debug, Clone)]
pub struct FixedDelayRestartBackoffTimeStrategy {
    max_number_restart_attempts: u32,
    backoff_time: Duration,
    current_restart_attempt: u32,
}

impl FixedDelayRestartBackoffTimeStrategy {
    pub fn new(max_number_restart_attempts: u32, backoff_time: Duration) -> Self {
        FixedDelayRestartBackoffTimeStrategy { max_number_restart_attempts, backoff_time, current_restart_attempt: 0 }
    }
}

impl RestartBackoffTimeStrategy for FixedDelayRestartBackoffTimeStrategy {
    fn can_restart(&self) -> bool {
        self.current_restart_attempt <= self.max_number_restart_attempts
    }

    fn get_backoff_time(&self) -> Duration {
        self.backoff_time
    }

    fn notify_failure(&mut self, _cause: &FailureCause) -> bool {
        self.current_restart_attempt = self.current_restart_attempt.saturating_add(1);
        true
    }
}

impl fmt::Display for FixedDelayRestartBackoffTimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FixedDelayRestartBackoffTimeStrategy(maxNumberRestartAttempts={}, backoffTimeMS={})",
            self.max_number_restart_attempts,
            self.backoff_time.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::failure::error_classification::failure_cause_from_message;

    #[test]
    fn test_stops_after_max_attempts() {
        let cause = failure_cause_from_message("boom");
        let mut strategy = FixedDelayRestartBackoffTimeStrategy::new(2, Duration::from_millis(100));

        strategy.notify_failure(&cause);
        assert!(strategy.can_restart());
        strategy.notify_failure(&cause);
        assert!(strategy.can_restart());
        strategy.notify_failure(&cause);
        assert!(!strategy.can_restart());
        assert_eq!(strategy.get_backoff_time(), Duration::from_millis(100));
    }
}
