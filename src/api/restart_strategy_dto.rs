use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::restart::RestartStrategyOptions;
use crate::domain::restart::exponential_delay::ExponentialDelayOptions;
use crate::error::{Error, Result};

/// Restart strategy configuration. `strategy` takes the names understood by `RestartStrategyType`.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RestartStrategyDto {
    pub strategy: String,

    pub fixed_delay_attempts: Option<u32>,
    pub fixed_delay_ms: Option<u64>,

    pub failure_rate_max_failures_per_interval: Option<usize>,
    pub failure_rate_interval_ms: Option<u64>,
    pub failure_rate_delay_ms: Option<u64>,

    pub exponential_delay: Option<ExponentialDelayDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ExponentialDelayDto {
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub reset_backoff_threshold_ms: Option<u64>,
    pub jitter_factor: Option<f64>,
    pub attempts_before_reset_backoff: Option<u32>,
}

impl TryFrom<ExponentialDelayDto> for ExponentialDelayOptions {
    type Error = Error;

    fn try_from(dto: ExponentialDelayDto) -> Result<Self> {
        let defaults = ExponentialDelayOptions::default();
        let options = ExponentialDelayOptions {
            initial_backoff: dto.initial_backoff_ms.map(Duration::from_millis).unwrap_or(defaults.initial_backoff),
            max_backoff: dto.max_backoff_ms.map(Duration::from_millis).unwrap_or(defaults.max_backoff),
            backoff_multiplier: dto.backoff_multiplier.unwrap_or(defaults.backoff_multiplier),
            reset_backoff_threshold: dto.reset_backoff_threshold_ms.map(Duration::from_millis).unwrap_or(defaults.reset_backoff_threshold),
            jitter_factor: dto.jitter_factor.unwrap_or(defaults.jitter_factor),
            attempts_before_reset_backoff: dto.attempts_before_reset_backoff.unwrap_or(defaults.attempts_before_reset_backoff),
        };

        if options.backoff_multiplier < 1.0 {
            return Err(Error::InvalidConfiguration(format!("backoffMultiplier must be at least 1, was {}.", options.backoff_multiplier)));
        }
        if !(0.0..=1.0).contains(&options.jitter_factor) {
            return Err(Error::InvalidConfiguration(format!("jitterFactor must be between 0 and 1, was {}.", options.jitter_factor)));
        }
        if options.initial_backoff > options.max_backoff {
            return Err(Error::InvalidConfiguration("initialBackoffMs must not exceed maxBackoffMs.".to_string()));
        }
        Ok(options)
    }
}

impl TryFrom<RestartStrategyDto> for RestartStrategyOptions {
    type Error = Error;

    fn try_from(dto: RestartStrategyDto) -> Result<Self> {
        let defaults = RestartStrategyOptions::default();
        let exponential_delay = match dto.exponential_delay {
            Some(exponential_delay) => ExponentialDelayOptions::try_from(exponential_delay)?,
            None => defaults.exponential_delay.clone(),
        };

        Ok(RestartStrategyOptions {
            strategy: dto.strategy.parse()?,
            fixed_delay_attempts: dto.fixed_delay_attempts.unwrap_or(defaults.fixed_delay_attempts),
            fixed_delay: dto.fixed_delay_ms.map(Duration::from_millis).unwrap_or(defaults.fixed_delay),
            failure_rate_max_failures_per_interval: dto
                .failure_rate_max_failures_per_interval
                .unwrap_or(defaults.failure_rate_max_failures_per_interval),
            failure_rate_interval: dto.failure_rate_interval_ms.map(Duration::from_millis).unwrap_or(defaults.failure_rate_interval),
            failure_rate_delay: dto.failure_rate_delay_ms.map(Duration::from_millis).unwrap_or(defaults.failure_rate_delay),
            exponential_delay,
        })
    }
}
