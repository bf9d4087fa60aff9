use std::time::Duration;

use crate::domain::job::job_graph::JobGraph;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerExecutionMode {
    #[default]
    Default,
    /// Parallelism follows the available resources, requirement updates are rejected.
    Reactive,
}

/// Timeouts and thresholds of the adaptive scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub execution_mode: SchedulerExecutionMode,
    /// How long to wait for sufficient resources before trying with what is there. `None` waits forever.
    pub submission_resource_wait_timeout: Option<Duration>,
    pub submission_resource_stabilization_timeout: Duration,
    pub slot_idle_timeout: Duration,
    pub executing_cooldown_timeout: Duration,
    pub executing_resource_stabilization_timeout: Duration,
    pub maximum_delay_for_triggering_rescale: Duration,
    pub rescale_on_failed_checkpoint_count: u32,
    pub max_exception_history_size: usize,
}

pub const DEFAULT_RESCALE_ON_FAILED_CHECKPOINT_COUNT: u32 = 2;

impl Settings {
    pub fn for_mode(execution_mode: SchedulerExecutionMode, checkpoint_interval: Option<Duration>) -> Self {
        let (wait_timeout, stabilization_timeout) = match execution_mode {
            SchedulerExecutionMode::Reactive => (None, Duration::ZERO),
            SchedulerExecutionMode::Default => (Some(Duration::from_secs(300)), Duration::from_secs(10)),
        };
        Settings {
            execution_mode,
            submission_resource_wait_timeout: wait_timeout,
            submission_resource_stabilization_timeout: stabilization_timeout,
            slot_idle_timeout: Duration::from_secs(50),
            executing_cooldown_timeout: Duration::from_secs(30),
            executing_resource_stabilization_timeout: Duration::from_secs(60),
            maximum_delay_for_triggering_rescale: default_maximum_delay_for_triggering_rescale(
                DEFAULT_RESCALE_ON_FAILED_CHECKPOINT_COUNT,
                checkpoint_interval,
            ),
            rescale_on_failed_checkpoint_count: DEFAULT_RESCALE_ON_FAILED_CHECKPOINT_COUNT,
            max_exception_history_size: 16,
        }
    }

    pub fn for_job(execution_mode: SchedulerExecutionMode, job_graph: &JobGraph) -> Self {
        Settings::for_mode(execution_mode, job_graph.checkpointing.as_ref().map(|checkpointing| checkpointing.checkpoint_interval))
    }

    pub fn validate(&self) -> Result<()> {
        if self.rescale_on_failed_checkpoint_count < 1 {
            return Err(Error::InvalidConfiguration("rescaleOnFailedCheckpointCount must be at least 1.".to_string()));
        }
        if self.slot_idle_timeout.is_zero() {
            return Err(Error::InvalidConfiguration("slotIdleTimeout must be positive.".to_string()));
        }
        Ok(())
    }

    pub fn is_reactive(&self) -> bool {
        self.execution_mode == SchedulerExecutionMode::Reactive
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::for_mode(SchedulerExecutionMode::Default, None)
    }
}

/// A rescale is forced once the given number of checkpoints could have failed.
pub fn default_maximum_delay_for_triggering_rescale(rescale_on_failed_checkpoint_count: u32, checkpoint_interval: Option<Duration>) -> Duration {
    checkpoint_interval.map(|interval| interval * (rescale_on_failed_checkpoint_count + 1)).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reactive_mode_waits_forever_without_stabilization() {
        let settings = Settings::for_mode(SchedulerExecutionMode::Reactive, None);
        assert_eq!(settings.submission_resource_wait_timeout, None);
        assert_eq!(settings.submission_resource_stabilization_timeout, Duration::ZERO);
        assert_eq!(settings.maximum_delay_for_triggering_rescale, Duration::ZERO);
    }

    #[test]
    fn test_rescale_delay_follows_checkpoint_interval() {
        let settings = Settings::for_mode(SchedulerExecutionMode::Default, Some(Duration::from_secs(10)));
        assert_eq!(settings.maximum_delay_for_triggering_rescale, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_zero_failed_checkpoint_count() {
        let settings = Settings { rescale_on_failed_checkpoint_count: 0, ..Settings::default() };
        assert!(matches!(settings.validate(), Err(Error::InvalidConfiguration(_))));
    }
}
