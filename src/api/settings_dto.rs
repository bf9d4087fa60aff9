use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::job::job_graph::JobGraph;
use crate::domain::scheduler::settings::{SchedulerExecutionMode, Settings, default_maximum_delay_for_triggering_rescale};
use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionModeDto {
    #[default]
    Default,
    Reactive,
}

/// Scheduler settings as found in a configuration file. Missing values take the defaults of the
/// execution mode. Durations are in milliseconds.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDto {
    #[serde(default)]
    pub execution_mode: ExecutionModeDto,
    /// A negative value waits forever.
    pub submission_resource_wait_timeout_ms: Option<i64>,
    pub submission_resource_stabilization_timeout_ms: Option<u64>,
    pub slot_idle_timeout_ms: Option<u64>,
    pub executing_cooldown_timeout_ms: Option<u64>,
    pub executing_resource_stabilization_timeout_ms: Option<u64>,
    pub maximum_delay_for_triggering_rescale_ms: Option<u64>,
    pub rescale_on_failed_checkpoint_count: Option<u32>,
    pub max_exception_history_size: Option<usize>,
}

impl From<ExecutionModeDto> for SchedulerExecutionMode {
    fn from(dto: ExecutionModeDto) -> Self {
        match dto {
            ExecutionModeDto::Default => SchedulerExecutionMode::Default,
            ExecutionModeDto::Reactive => SchedulerExecutionMode::Reactive,
        }
    }
}

impl SettingsDto {
    /// Settings for `job_graph`. Without an explicit value the rescale delay follows its checkpoint interval.
    pub fn into_settings(self, job_graph: &JobGraph) -> Result<Settings> {
        let checkpoint_interval = job_graph.checkpointing.as_ref().map(|checkpointing| checkpointing.checkpoint_interval);
        self.into_settings_with_checkpoint_interval(checkpoint_interval)
    }

    fn into_settings_with_checkpoint_interval(self, checkpoint_interval: Option<Duration>) -> Result<Settings> {
        let mut settings = Settings::for_mode(self.execution_mode.into(), checkpoint_interval);

        if let Some(timeout) = self.submission_resource_wait_timeout_ms {
            settings.submission_resource_wait_timeout = u64::try_from(timeout).ok().map(Duration::from_millis);
        }
        if let Some(timeout) = self.submission_resource_stabilization_timeout_ms {
            settings.submission_resource_stabilization_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.slot_idle_timeout_ms {
            settings.slot_idle_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.executing_cooldown_timeout_ms {
            settings.executing_cooldown_timeout = Duration::from_millis(timeout);
        }
        if let Some(timeout) = self.executing_resource_stabilization_timeout_ms {
            settings.executing_resource_stabilization_timeout = Duration::from_millis(timeout);
        }
        if let Some(count) = self.rescale_on_failed_checkpoint_count {
            settings.rescale_on_failed_checkpoint_count = count;
            settings.maximum_delay_for_triggering_rescale = default_maximum_delay_for_triggering_rescale(count, checkpoint_interval);
        }
        if let Some(delay) = self.maximum_delay_for_triggering_rescale_ms {
            settings.maximum_delay_for_triggering_rescale = Duration::from_millis(delay);
        }
        if let Some(size) = self.max_exception_history_size {
            if size == 0 {
                return Err(Error::InvalidConfiguration("maxExceptionHistorySize must be positive.".to_string()));
            }
            settings.max_exception_history_size = size;
        }

        settings.validate()?;
        Ok(settings)
    }
}

impl TryFrom<SettingsDto> for Settings {
    type Error = Error;

    fn try_from(dto: SettingsDto) -> Result<Self> {
        dto.into_settings_with_checkpoint_interval(None)
    }
}
