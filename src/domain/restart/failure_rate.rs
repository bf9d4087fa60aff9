use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::domain::clock::clock::{SharedClock, add_millis};
use crate::domain::failure::error_classification::FailureCause;
use crate::domain::restart::restart_backoff_time_strategy::RestartBackoffTimeStrategy;

/// Allows at most `max_failures_per_interval` restarts within any sliding `failures_interval`.
#[derive(Debug)]
pub struct FailureRateRestartBackoffTimeStrategy {
    max_failures_per_interval: usize,
    failures_interval: Duration,
    backoff_time: Duration,
    failure_timestamps: VecDeque<i64>,
    clock: SharedClock,
}

impl FailureRateRestartBackoffTimeStrategy {
    pub fn new(max_failures_per_interval: usize, failures_interval: Duration, backoff_time: Duration, clock: SharedClock) -> Self {
        FailureRateRestartBackoffTimeStrategy {
            max_failures_per_interval,
            failures_interval,
            backoff_time,
            failure_timestamps: VecDeque::with_capacity(max_failures_per_interval + 1),
            clock,
        }
    }

    fn is_failure_timestamps_queue_full(&self) -> bool {
        self.failure_timestamps.len() > self.max_failures_per_interval
    }
}

impl RestartBackoffTimeStrategy for FailureRateRestartBackoffTimeStrategy {
    fn can_restart(&self) -> bool {
        if !self.is_failure_timestamps_queue_full() {
            return true;
        }
        match self.failure_timestamps.front() {
            Some(earliest) => add_millis(*earliest, self.failures_interval) < self.clock.current_time_millis(),
            None => true,
        }
    }

    fn get_backoff_time(&self) -> Duration {
        self.backoff_time
    }

    fn notify_failure(&mut self, _cause: &FailureCause) -> bool {
        if self.is_failure_timestamps_queue_full() {
            self.failure_timestamps.pop_front();
        }
        self.failure_timestamps.push_back(self.clock.current_time_millis());
        true
    }
}

impl fmt::Display for FailureRateRestartBackoffTimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FailureRateRestartBackoffTimeStrategy(failuresIntervalMS={}, backoffTimeMS={}, maxFailuresPerInterval={})",
            self.failures_interval.as_millis(),
            self.backoff_time.as_millis(),
            self.max_failures_per_interval
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::ManualClock;
    use crate::domain::failure::error_classification::failure_cause_from_message;
    use std::sync::Arc;

    #[test]
    fn test_too_many_failures_within_interval() {
        let clock = ManualClock::new(0);
        let cause = failure_cause_from_message("boom");
        let mut strategy = FailureRateRestartBackoffTimeStrategy::new(2, Duration::from_secs(10), Duration::ZERO, Arc::new(clock.clone()));

        strategy.notify_failure(&cause);
        strategy.notify_failure(&cause);
        assert!(strategy.can_restart());

        clock.advance(Duration::from_secs(1));
        strategy.notify_failure(&cause);
        assert!(!strategy.can_restart());
    }

    #[test]
    fn test_old_failures_fall_out_of_interval() {
        let clock = ManualClock::new(0);
        let cause = failure_cause_from_message("boom");
        let mut strategy = FailureRateRestartBackoffTimeStrategy::new(1, Duration::from_secs(10), Duration::ZERO, Arc::new(clock.clone()));

        strategy.notify_failure(&cause);
        clock.advance(Duration::from_secs(11));
        strategy.notify_failure(&cause);
        assert!(strategy.can_restart());
    }
}
