pub mod exponential_delay;
pub mod failure_rate;
pub mod fixed_delay;
pub mod no_restart;
pub mod restart_backoff_time_strategy;

use std::str::FromStr;
use std::time::Duration;

use crate::domain::clock::clock::SharedClock;
use crate::domain::restart::exponential_delay::{ExponentialDelayOptions, ExponentialDelayRestartBackoffTimeStrategy};
use crate::domain::restart::failure_rate::FailureRateRestartBackoffTimeStrategy;
use crate::domain::restart::fixed_delay::FixedDelayRestartBackoffTimeStrategy;
use crate::domain::restart::no_restart::NoRestartBackoffTimeStrategy;
use crate::domain::restart::restart_backoff_time_strategy::RestartBackoffTimeStrategy;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartStrategyType {
    NoRestart,
    FixedDelay,
    FailureRate,
    ExponentialDelay,
}

impl FromStr for RestartStrategyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "disable" | "no-restart" => Ok(RestartStrategyType::NoRestart),
            "fixed-delay" | "fixeddelay" => Ok(RestartStrategyType::FixedDelay),
            "failure-rate" | "failurerate" => Ok(RestartStrategyType::FailureRate),
            "exponential-delay" | "exponentialdelay" => Ok(RestartStrategyType::ExponentialDelay),
            _ => Err(Error::InvalidConfiguration(format!("Unknown restart strategy '{}'.", s))),
        }
    }
}

/// Parameters of every restart strategy. Only the ones of the selected type are used.
#[derive(Debug, Clone)]
pub struct RestartStrategyOptions {
    pub strategy: RestartStrategyType,
    pub fixed_delay_attempts: u32,
    pub fixed_delay: Duration,
    pub failure_rate_max_failures_per_interval: usize,
    pub failure_rate_interval: Duration,
    pub failure_rate_delay: Duration,
    pub exponential_delay: ExponentialDelayOptions,
}

impl RestartStrategyOptions {
    /// Jobs without checkpointing are not restarted by default, checkpointed jobs back off exponentially.
    pub fn default_for(checkpointing_enabled: bool) -> Self {
        let strategy = if checkpointing_enabled { RestartStrategyType::ExponentialDelay } else { RestartStrategyType::NoRestart };
        RestartStrategyOptions { strategy, ..RestartStrategyOptions::default() }
    }
}

impl Default for RestartStrategyOptions {
    fn default() -> Self {
        RestartStrategyOptions {
            strategy: RestartStrategyType::NoRestart,
            fixed_delay_attempts: 1,
            fixed_delay: Duration::from_secs(1),
            failure_rate_max_failures_per_interval: 1,
            failure_rate_interval: Duration::from_secs(60),
            failure_rate_delay: Duration::from_secs(1),
            exponential_delay: ExponentialDelayOptions::default(),
        }
    }
}

impl RestartStrategyType {
    /// Factory method creating the configured strategy.
    pub fn get_instance(&self, options: &RestartStrategyOptions, clock: SharedClock) -> Box<dyn RestartBackoffTimeStrategy> {
        match self {
            RestartStrategyType::NoRestart => Box::new(NoRestartBackoffTimeStrategy),
            RestartStrategyType::FixedDelay => {
                Box::new(FixedDelayRestartBackoffTimeStrategy::new(options.fixed_delay_attempts, options.fixed_delay))
            }
            RestartStrategyType::FailureRate => Box::new(FailureRateRestartBackoffTimeStrategy::new(
                options.failure_rate_max_failures_per_interval,
                options.failure_rate_interval,
                options.failure_rate_delay,
                clock,
            )),
            RestartStrategyType::ExponentialDelay => {
                Box::new(ExponentialDelayRestartBackoffTimeStrategy::new(options.exponential_delay.clone(), clock))
            }
        }
    }
}
