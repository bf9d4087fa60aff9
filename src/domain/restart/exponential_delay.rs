use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::domain::clock::clock::{SharedClock, add_millis};
use crate::domain::failure::error_classification::FailureCause;
use crate::domain::restart::restart_backoff_time_strategy::RestartBackoffTimeStrategy;

#[derive(Debug, Clone)]
pub struct ExponentialDelayOptions {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// A failure this long after the previous one resets the backoff.
    pub reset_backoff_threshold: Duration,
    /// Fraction of the backoff added or removed at random.
    pub jitter_factor: f64,
    pub attempts_before_reset_backoff: u32,
}

impl Default for ExponentialDelayOptions {
    fn default() -> Self {
        ExponentialDelayOptions {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            reset_backoff_threshold: Duration::from_secs(3600),
            jitter_factor: 0.1,
            attempts_before_reset_backoff: u32::MAX,
        }
    }
}

/// Backoff that grows by a multiplier on every failure and falls back to the initial value after
/// a quiet period.
#[derive(Debug)]
pub struct ExponentialDelayRestartBackoffTimeStrategy {
    options: ExponentialDelayOptions,
    clock: SharedClock,
    current_backoff: Duration,
    current_restart_attempt: u32,
    last_failure_timestamp: Option<i64>,
}

impl ExponentialDelayRestartBackoffTimeStrategy {
    pub fn new(options: ExponentialDelayOptions, clock: SharedClock) -> Self {
        ExponentialDelayRestartBackoffTimeStrategy {
            current_backoff: Duration::ZERO,
            current_restart_attempt: 0,
            last_failure_timestamp: None,
            options,
            clock,
        }
    }

    fn apply_jitter(&self, backoff: Duration) -> Duration {
        if self.options.jitter_factor <= 0.0 || backoff.is_zero() {
            return backoff;
        }
        let backoff_millis = backoff.as_millis() as f64;
        let jitter = backoff_millis * self.options.jitter_factor;
        let offset = rand::rng().random_range(-jitter..=jitter);
        let jittered = (backoff_millis + offset).max(0.0).round() as u64;
        Duration::from_millis(jittered).min(self.options.max_backoff)
    }
}

impl RestartBackoffTimeStrategy for ExponentialDelayRestartBackoffTimeStrategy {
    fn can_restart(&self) -> bool {
        self.current_restart_attempt <= self.options.attempts_before_reset_backoff
    }

    fn get_backoff_time(&self) -> Duration {
        self.current_backoff
    }

    fn notify_failure(&mut self, _cause: &FailureCause) -> bool {
        let now = self.clock.current_time_millis();

        let next_backoff = match self.last_failure_timestamp {
            Some(last) if add_millis(last, self.options.reset_backoff_threshold) > now => {
                let grown = (self.current_backoff.as_millis() as f64 * self.options.backoff_multiplier).round() as u64;
                Duration::from_millis(grown).min(self.options.max_backoff).max(self.options.initial_backoff)
            }
            Some(_) => {
                self.current_restart_attempt = 0;
                self.options.initial_backoff
            }
            None => self.options.initial_backoff,
        };

        self.last_failure_timestamp = Some(now);
        self.current_restart_attempt = self.current_restart_attempt.saturating_add(1);
        self.current_backoff = self.apply_jitter(next_backoff);
        true
    }
}

impl fmt::Display for ExponentialDelayRestartBackoffTimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExponentialDelayRestartBackoffTimeStrategy(initialBackoffMS={}, maxBackoffMS={}, backoffMultiplier={}, resetBackoffThresholdMS={}, jitterFactor={}, attemptsBeforeResetBackoff={}, currentBackoffMS={})",
            self.options.initial_backoff.as_millis(),
            self.options.max_backoff.as_millis(),
            self.options.backoff_multiplier,
            self.options.reset_backoff_threshold.as_millis(),
            self.options.jitter_factor,
            self.options.attempts_before_reset_backoff,
            self.current_backoff.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::ManualClock;
    use crate::domain::failure::error_classification::failure_cause_from_message;
    use std::sync::Arc;

    fn without_jitter() -> ExponentialDelayOptions {
        ExponentialDelayOptions {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            reset_backoff_threshold: Duration::from_secs(10),
            jitter_factor: 0.0,
            attempts_before_reset_backoff: 10,
        }
    }

    #[test]
    fn test_backoff_grows_up_to_max() {
        let clock = ManualClock::new(0);
        let cause = failure_cause_from_message("boom");
        let mut strategy = ExponentialDelayRestartBackoffTimeStrategy::new(without_jitter(), Arc::new(clock.clone()));

        strategy.notify_failure(&cause);
        assert_eq!(strategy.get_backoff_time(), Duration::from_millis(100));
        strategy.notify_failure(&cause);
        assert_eq!(strategy.get_backoff_time(), Duration::from_millis(200));
        strategy.notify_failure(&cause);
        assert_eq!(strategy.get_backoff_time(), Duration::from_millis(350));
    }

    #[test]
    fn test_backoff_resets_after_quiet_period() {
        let clock = ManualClock::new(0);
        let cause = failure_cause_from_message("boom");
        let mut strategy = ExponentialDelayRestartBackoffTimeStrategy::new(without_jitter(), Arc::new(clock.clone()));

        strategy.notify_failure(&cause);
        strategy.notify_failure(&cause);
        clock.advance(Duration::from_secs(11));
        strategy.notify_failure(&cause);

        assert_eq!(strategy.get_backoff_time(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let clock = ManualClock::new(0);
        let cause = failure_cause_from_message("boom");
        let options = ExponentialDelayOptions { jitter_factor: 0.5, ..without_jitter() };
        let mut strategy = ExponentialDelayRestartBackoffTimeStrategy::new(options, Arc::new(clock));

        strategy.notify_failure(&cause);
        let backoff = strategy.get_backoff_time();
        assert!(backoff >= Duration::from_millis(50) && backoff <= Duration::from_millis(150));
    }

    #[test]
    fn test_attempt_limit() {
        let clock = ManualClock::new(0);
        let cause = failure_cause_from_message("boom");
        let options = ExponentialDelayOptions { attempts_before_reset_backoff: 1, ..without_jitter() };
        let mut strategy = ExponentialDelayRestartBackoffTimeStrategy::new(options, Arc::new(clock));

        strategy.notify_failure(&cause);
        assert!(strategy.can_restart());
        strategy.notify_failure(&cause);
        assert!(!strategy.can_restart());
    }
}
