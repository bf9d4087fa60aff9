use std::collections::{BTreeMap, HashSet};

use futures::FutureExt;

use crate::domain::checkpoint::checkpoint_exception::{CheckpointException, CheckpointFailureReason};
use crate::domain::checkpoint::checkpoint_services::CheckpointServices;
use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, CompletedCheckpoint};
use crate::domain::job::job_graph::CheckpointingSettings;
use crate::domain::utils::id::{ExecutionAttemptId, JobId, JobVertexId};
use crate::domain::utils::operation_future::{OperationCompleter, OperationFuture, failed_future, operation_future};
use crate::error::Error;

/// How a pending checkpoint ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    Completed(CompletedCheckpoint),
    Failed { checkpoint_id: u64, properties: CheckpointProperties, reason: CheckpointFailureReason },
}

impl CheckpointOutcome {
    pub fn checkpoint_id(&self) -> u64 {
        match self {
            CheckpointOutcome::Completed(checkpoint) => checkpoint.checkpoint_id,
            CheckpointOutcome::Failed { checkpoint_id, .. } => *checkpoint_id,
        }
    }
}

/// A triggered checkpoint. `checkpoint_id` is `None` if triggering failed right away.
pub struct TriggeredCheckpoint {
    pub checkpoint_id: Option<u64>,
    pub result: OperationFuture<CompletedCheckpoint>,
}

impl TriggeredCheckpoint {
    fn failed(exception: CheckpointException) -> Self {
        TriggeredCheckpoint { checkpoint_id: None, result: failed_future(Error::Checkpoint(exception)) }
    }
}

struct PendingCheckpoint {
    timestamp: i64,
    properties: CheckpointProperties,
    external_pointer: String,
    not_yet_acknowledged: HashSet<ExecutionAttemptId>,
    completer: OperationCompleter<CompletedCheckpoint>,
}

/// Coordinates the checkpoints of one execution graph.
pub struct CheckpointCoordinator {
    job_id: JobId,
    settings: Option<CheckpointingSettings>,
    services: CheckpointServices,
    pending: BTreeMap<u64, PendingCheckpoint>,
    periodic_scheduling: bool,
    shut_down: bool,
    vertex_max_parallelism: BTreeMap<JobVertexId, u32>,
}

impl CheckpointCoordinator {
    pub fn new(job_id: JobId, settings: Option<CheckpointingSettings>, services: CheckpointServices) -> Self {
        CheckpointCoordinator {
            job_id,
            settings,
            services,
            pending: BTreeMap::new(),
            periodic_scheduling: false,
            shut_down: false,
            vertex_max_parallelism: BTreeMap::new(),
        }
    }

    /// Max parallelism recorded in every checkpoint completed from now on.
    pub fn set_vertex_max_parallelism(&mut self, vertex_max_parallelism: BTreeMap<JobVertexId, u32>) {
        self.vertex_max_parallelism = vertex_max_parallelism;
    }

    pub fn is_periodic_checkpointing_configured(&self) -> bool {
        self.settings.is_some()
    }

    pub fn checkpoint_interval(&self) -> Option<std::time::Duration> {
        self.settings.as_ref().map(|settings| settings.checkpoint_interval)
    }

    pub fn start_checkpoint_scheduler(&mut self) {
        if self.is_periodic_checkpointing_configured() && !self.shut_down {
            self.periodic_scheduling = true;
        }
    }

    pub fn stop_checkpoint_scheduler(&mut self) {
        self.periodic_scheduling = false;
    }

    pub fn is_periodic_checkpointing_started(&self) -> bool {
        self.periodic_scheduling
    }

    pub fn number_of_pending_checkpoints(&self) -> usize {
        self.pending.len()
    }

    /// Starts a checkpoint every attempt in `tasks_to_acknowledge` has to confirm.
    pub fn trigger_checkpoint(&mut self, properties: CheckpointProperties, tasks_to_acknowledge: Vec<ExecutionAttemptId>, now: i64) -> TriggeredCheckpoint {
        if self.shut_down {
            return TriggeredCheckpoint::failed(CheckpointException::new(CheckpointFailureReason::CheckpointCoordinatorShutdown));
        }

        let external_pointer = match self.resolve_target(&properties) {
            Ok(pointer) => pointer,
            Err(exception) => return TriggeredCheckpoint::failed(exception),
        };

        let checkpoint_id = match self.services.checkpoint_id_counter.get_and_increment() {
            Ok(id) => id,
            Err(e) => {
                return TriggeredCheckpoint::failed(CheckpointException::with_detail(
                    e.to_string(),
                    CheckpointFailureReason::TriggerCheckpointFailure,
                ));
            }
        };
        let external_pointer = external_pointer.unwrap_or_else(|| format!("{}/chk-{}", self.job_id, checkpoint_id));

        self.services.checkpoint_stats_tracker.report_pending_checkpoint(checkpoint_id, now, &properties);
        log::info!("Triggering checkpoint {} (savepoint: {}) for job {}.", checkpoint_id, properties.is_savepoint(), self.job_id);

        let (completer, result) = operation_future();
        self.pending.insert(
            checkpoint_id,
            PendingCheckpoint { timestamp: now, properties, external_pointer, not_yet_acknowledged: tasks_to_acknowledge.into_iter().collect(), completer },
        );

        if self.pending.get(&checkpoint_id).is_some_and(|pending| pending.not_yet_acknowledged.is_empty()) {
            self.complete_pending_checkpoint(checkpoint_id, now);
        }

        TriggeredCheckpoint { checkpoint_id: Some(checkpoint_id), result }
    }

    /// Records an acknowledgement. Returns the outcome if this completed the checkpoint.
    pub fn receive_acknowledge(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64, now: i64) -> Option<CheckpointOutcome> {
        let Some(pending) = self.pending.get_mut(&checkpoint_id) else {
            log::debug!("Received late or unknown acknowledgement of checkpoint {} from {}.", checkpoint_id, attempt);
            return None;
        };
        if !pending.not_yet_acknowledged.remove(attempt) {
            log::debug!("Ignoring unexpected acknowledgement of checkpoint {} from {}.", checkpoint_id, attempt);
            return None;
        }
        if pending.not_yet_acknowledged.is_empty() { self.complete_pending_checkpoint(checkpoint_id, now) } else { None }
    }

    pub fn receive_decline(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64, detail: &str) -> Option<CheckpointOutcome> {
        if !self.pending.contains_key(&checkpoint_id) {
            log::debug!("Received decline of unknown checkpoint {} from {}.", checkpoint_id, attempt);
            return None;
        }
        log::info!("Checkpoint {} was declined by {}: {}", checkpoint_id, attempt, detail);
        self.abort_pending(checkpoint_id, CheckpointException::with_detail(detail, CheckpointFailureReason::CheckpointDeclined))
    }

    /// Fails every pending checkpoint with `reason`.
    pub fn abort_pending_checkpoints(&mut self, reason: CheckpointFailureReason) -> Vec<CheckpointOutcome> {
        let ids: Vec<u64> = self.pending.keys().copied().collect();
        ids.into_iter().filter_map(|id| self.abort_pending(id, CheckpointException::new(reason))).collect()
    }

    /// Looks up the checkpoint a new execution graph starts from.
    pub fn restore_latest_checkpointed_state(&self, now: i64) -> Option<CompletedCheckpoint> {
        let latest = self.services.completed_checkpoint_store.get_latest_checkpoint()?;
        log::info!("Restoring job {} from checkpoint {} ({}).", self.job_id, latest.checkpoint_id, latest.external_pointer);
        self.services.checkpoint_stats_tracker.report_restored_checkpoint(&latest, now);
        Some(latest)
    }

    pub fn shutdown(&mut self) -> Vec<CheckpointOutcome> {
        self.stop_checkpoint_scheduler();
        let outcomes = self.abort_pending_checkpoints(CheckpointFailureReason::CheckpointCoordinatorShutdown);
        self.shut_down = true;
        outcomes
    }

    fn resolve_target(&self, properties: &CheckpointProperties) -> Result<Option<String>, CheckpointException> {
        if !properties.is_savepoint() {
            return Ok(None);
        }
        let directory = properties
            .target_location
            .clone()
            .or_else(|| self.settings.as_ref().and_then(|settings| settings.default_savepoint_directory.clone()))
            .ok_or_else(|| {
                CheckpointException::with_detail(
                    "No savepoint directory configured. Specify a target directory or configure a default savepoint directory.",
                    CheckpointFailureReason::TriggerCheckpointFailure,
                )
            })?;

        let job_prefix: String = self.job_id.as_str().chars().take(6).collect();
        let suffix = rand::random::<u64>() & 0xffff_ffff_ffff;
        Ok(Some(format!("{}/savepoint-{}-{:012x}", directory.trim_end_matches('/'), job_prefix, suffix)))
    }

    fn complete_pending_checkpoint(&mut self, checkpoint_id: u64, now: i64) -> Option<CheckpointOutcome> {
        let pending = self.pending.remove(&checkpoint_id)?;
        let checkpoint = CompletedCheckpoint {
            job_id: self.job_id.clone(),
            checkpoint_id,
            timestamp: pending.timestamp,
            completion_timestamp: now,
            properties: pending.properties.clone(),
            external_pointer: pending.external_pointer,
            vertex_max_parallelism: self.vertex_max_parallelism.clone(),
        };

        if let Err(e) = self.services.completed_checkpoint_store.add_checkpoint_and_subsume_oldest(checkpoint.clone()) {
            log::warn!("Could not store checkpoint {}: {}", checkpoint_id, e);
            let reason = CheckpointFailureReason::FinalizeCheckpointFailure;
            self.services.checkpoint_stats_tracker.report_failed_checkpoint(checkpoint_id, reason);
            pending.completer.fail(Error::Checkpoint(CheckpointException::with_detail(e.to_string(), reason)));
            return Some(CheckpointOutcome::Failed { checkpoint_id, properties: pending.properties, reason });
        }

        log::info!("Completed checkpoint {} for job {} ({}).", checkpoint_id, self.job_id, checkpoint.external_pointer);
        self.services.checkpoint_stats_tracker.report_completed_checkpoint(&checkpoint);
        pending.completer.complete(checkpoint.clone());
        Some(CheckpointOutcome::Completed(checkpoint))
    }

    fn abort_pending(&mut self, checkpoint_id: u64, exception: CheckpointException) -> Option<CheckpointOutcome> {
        let pending = self.pending.remove(&checkpoint_id)?;
        let reason = exception.reason;
        self.services.checkpoint_stats_tracker.report_failed_checkpoint(checkpoint_id, reason);
        pending.completer.fail(Error::Checkpoint(exception));
        Some(CheckpointOutcome::Failed { checkpoint_id, properties: pending.properties, reason })
    }
}

/// Maps a completed checkpoint future to the checkpoint's external pointer.
pub fn external_pointer_of(result: OperationFuture<CompletedCheckpoint>) -> OperationFuture<String> {
    result.map(|result| result.map(|checkpoint| checkpoint.external_pointer)).boxed()
}

impl std::fmt::Debug for CheckpointCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointCoordinator")
            .field("job_id", &self.job_id)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("periodic_scheduling", &self.periodic_scheduling)
            .finish()
    }
}
