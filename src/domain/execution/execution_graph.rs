use std::collections::{BTreeMap, BTreeSet};

use crate::domain::allocator::job_allocations_information::{JobAllocationsInformation, PreviousAllocation};
use crate::domain::allocator::slot_allocator::{LogicalSlot, ReservedSlots};
use crate::domain::checkpoint::checkpoint_coordinator::{CheckpointCoordinator, CheckpointOutcome, TriggeredCheckpoint};
use crate::domain::checkpoint::checkpoint_exception::{CheckpointException, CheckpointFailureReason};
use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, CompletedCheckpoint};
use crate::domain::clock::clock::SharedClock;
use crate::domain::execution::archived_execution_graph::ErrorInfo;
use crate::domain::execution::execution_state::{ExecutionState, TaskExecutionStateTransition};
use crate::domain::execution::vertex_attempt_number_store::VertexAttemptNumberStore;
use crate::domain::failure::error_classification::{FailureCause, stringify_failure};
use crate::domain::job::job_graph::JobType;
use crate::domain::job::job_information::JobGraphJobInformation;
use crate::domain::job::job_status::JobStatus;
use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::domain::slot_pool::slot_info::TaskManagerLocation;
use crate::domain::utils::id::{AllocationId, ExecutionAttemptId, ExecutionVertexId, JobId, JobVertexId};
use crate::domain::utils::operation_future::failed_future;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Execution {
    pub attempt_id: ExecutionAttemptId,
    pub state: ExecutionState,
    pub assigned_slot: Option<LogicalSlot>,
    pub failure_info: Option<ErrorInfo>,
}

#[derive(Debug, Clone)]
pub struct ExecutionVertex {
    pub id: ExecutionVertexId,
    pub task_name_with_subtask_index: String,
    pub current_execution: Execution,
}

#[derive(Debug, Clone)]
pub struct ExecutionJobVertex {
    pub id: JobVertexId,
    pub name: String,
    pub max_parallelism: u32,
    pub has_blocking_output: bool,
    pub task_vertices: Vec<ExecutionVertex>,
}

impl ExecutionJobVertex {
    pub fn parallelism(&self) -> u32 {
        self.task_vertices.len() as u32
    }
}

/// Runtime form of a job: one execution vertex per subtask, plus the job status and checkpointing.
#[derive(Debug)]
pub struct ExecutionGraph {
    job_id: JobId,
    job_name: String,
    job_type: JobType,
    state: JobStatus,
    job_vertices: Vec<ExecutionJobVertex>,
    parallelism_store: VertexParallelismStore,
    checkpoint_coordinator: CheckpointCoordinator,
    state_timestamps: BTreeMap<JobStatus, i64>,
    failure_info: Option<ErrorInfo>,
    restored_checkpoint: Option<CompletedCheckpoint>,
    clock: SharedClock,
}

impl ExecutionGraph {
    /// Creates one execution vertex per subtask, with the parallelism taken from `parallelism_store`.
    pub fn new(
        job_information: &JobGraphJobInformation,
        parallelism_store: VertexParallelismStore,
        attempt_numbers: &VertexAttemptNumberStore,
        mut checkpoint_coordinator: CheckpointCoordinator,
        clock: SharedClock,
    ) -> Result<Self> {
        let job_graph = job_information.job_graph();
        let mut job_vertices = Vec::with_capacity(job_graph.number_of_vertices());

        for vertex in job_graph.vertices() {
            let info = parallelism_store
                .get_parallelism_info(&vertex.id)
                .ok_or_else(|| Error::ExecutionGraphCreation(format!("No parallelism information for vertex {}", vertex.id)))?;
            let parallelism = info.parallelism();

            let task_vertices = (0..parallelism)
                .map(|subtask| {
                    let id = ExecutionVertexId::new(vertex.id.clone(), subtask);
                    let attempt_number = attempt_numbers.get_attempt_count(&id);
                    ExecutionVertex {
                        task_name_with_subtask_index: format!("{} ({}/{})", vertex.name, subtask + 1, parallelism),
                        current_execution: Execution {
                            attempt_id: ExecutionAttemptId::new(id.clone(), attempt_number),
                            state: ExecutionState::Created,
                            assigned_slot: None,
                            failure_info: None,
                        },
                        id,
                    }
                })
                .collect();

            job_vertices.push(ExecutionJobVertex {
                id: vertex.id.clone(),
                name: vertex.name.clone(),
                max_parallelism: info.max_parallelism(),
                has_blocking_output: vertex.produced_data_sets.iter().any(|data_set| data_set.result_type.is_blocking()),
                task_vertices,
            });
        }

        checkpoint_coordinator.set_vertex_max_parallelism(max_parallelism_of(&job_vertices));

        let now = clock.current_time_millis();
        Ok(ExecutionGraph {
            job_id: job_information.job_id().clone(),
            job_name: job_information.name().to_string(),
            job_type: job_information.job_type(),
            state: JobStatus::Created,
            job_vertices,
            parallelism_store,
            checkpoint_coordinator,
            state_timestamps: BTreeMap::from([(JobStatus::Created, now)]),
            failure_info: None,
            restored_checkpoint: None,
            clock,
        })
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn state(&self) -> JobStatus {
        self.state
    }

    pub fn state_timestamps(&self) -> &BTreeMap<JobStatus, i64> {
        &self.state_timestamps
    }

    pub fn failure_info(&self) -> Option<&ErrorInfo> {
        self.failure_info.as_ref()
    }

    pub fn parallelism_store(&self) -> &VertexParallelismStore {
        &self.parallelism_store
    }

    pub fn job_vertices(&self) -> &[ExecutionJobVertex] {
        &self.job_vertices
    }

    pub fn job_vertex(&self, id: &JobVertexId) -> Option<&ExecutionJobVertex> {
        self.job_vertices.iter().find(|vertex| &vertex.id == id)
    }

    pub fn execution_vertices(&self) -> impl Iterator<Item = &ExecutionVertex> {
        self.job_vertices.iter().flat_map(|vertex| vertex.task_vertices.iter())
    }

    pub fn execution_vertex(&self, id: &ExecutionVertexId) -> Option<&ExecutionVertex> {
        self.job_vertex(&id.job_vertex_id)?.task_vertices.get(id.subtask_index as usize)
    }

    /// State of `attempt` if it is the current attempt of its subtask.
    pub fn execution_state_of(&self, attempt: &ExecutionAttemptId) -> Option<ExecutionState> {
        let vertex = self.execution_vertex(&attempt.execution_vertex_id)?;
        (vertex.current_execution.attempt_id == *attempt).then_some(vertex.current_execution.state)
    }

    pub fn is_any_output_blocking(&self) -> bool {
        self.job_vertices.iter().any(|vertex| vertex.has_blocking_output)
    }

    pub fn checkpoint_coordinator(&self) -> &CheckpointCoordinator {
        &self.checkpoint_coordinator
    }

    pub fn checkpoint_coordinator_mut(&mut self) -> &mut CheckpointCoordinator {
        &mut self.checkpoint_coordinator
    }

    pub fn restored_checkpoint(&self) -> Option<&CompletedCheckpoint> {
        self.restored_checkpoint.as_ref()
    }

    /// Looks up the latest completed checkpoint and remembers it as the state to start from.
    ///
    /// A vertex whose max parallelism differs from the checkpoint's takes over the checkpointed
    /// value, unless its validator rejects that change.
    pub fn restore_latest_checkpointed_state(&mut self) -> Result<()> {
        let now = self.clock.current_time_millis();
        let Some(checkpoint) = self.checkpoint_coordinator.restore_latest_checkpointed_state(now) else {
            return Ok(());
        };

        for job_vertex in self.job_vertices.iter_mut() {
            let Some(&checkpointed) = checkpoint.vertex_max_parallelism.get(&job_vertex.id) else {
                continue;
            };
            if checkpointed == job_vertex.max_parallelism {
                continue;
            }
            let rejection = self
                .parallelism_store
                .get_parallelism_info(&job_vertex.id)
                .and_then(|info| info.can_rescale_max_parallelism(checkpointed));
            if let Some(reason) = rejection {
                return Err(Error::ExecutionGraphCreation(format!(
                    "Cannot restore vertex {} from checkpoint {} with max parallelism {}: {}",
                    job_vertex.name, checkpoint.checkpoint_id, checkpointed, reason
                )));
            }
            log::info!(
                "Vertex {} takes over the max parallelism {} of checkpoint {}.",
                job_vertex.name,
                checkpointed,
                checkpoint.checkpoint_id
            );
            job_vertex.max_parallelism = checkpointed;
        }

        self.checkpoint_coordinator.set_vertex_max_parallelism(max_parallelism_of(&self.job_vertices));
        self.restored_checkpoint = Some(checkpoint);
        Ok(())
    }

    pub fn transition_to_running(&mut self) {
        if self.state != JobStatus::Created {
            log::warn!("Job {} cannot switch to RUNNING from {}.", self.job_id, self.state);
            return;
        }
        self.transition_state(JobStatus::Running);
    }

    /// Assigns every subtask the slot reserved for it and marks it scheduled.
    pub fn assign_slots(&mut self, reserved_slots: &ReservedSlots) -> Result<()> {
        for vertex in self.job_vertices.iter_mut().flat_map(|vertex| vertex.task_vertices.iter_mut()) {
            let slot = reserved_slots
                .get_slot_for(&vertex.id)
                .ok_or_else(|| Error::NoResourceAvailable(format!("No slot reserved for {}", vertex.task_name_with_subtask_index)))?;
            vertex.current_execution.assigned_slot = Some(slot.clone());
            vertex.current_execution.state = ExecutionState::Scheduled;
        }
        Ok(())
    }

    /// Deploys every scheduled subtask into its slot.
    pub fn deploy(&mut self) {
        for vertex in self.job_vertices.iter_mut().flat_map(|vertex| vertex.task_vertices.iter_mut()) {
            let execution = &mut vertex.current_execution;
            if execution.state == ExecutionState::Scheduled {
                log::debug!("Deploying {} (attempt {}).", vertex.task_name_with_subtask_index, execution.attempt_id.attempt_number);
                execution.state = ExecutionState::Deploying;
            }
        }
    }

    /// Applies a status report. Returns `false` for unknown or outdated attempts.
    pub fn update_state(&mut self, transition: &TaskExecutionStateTransition) -> bool {
        let now = self.clock.current_time_millis();
        let Some(execution) = self.current_execution_mut(&transition.attempt_id) else {
            return false;
        };
        if execution.state.is_terminal() {
            return false;
        }

        match transition.execution_state {
            ExecutionState::Initializing | ExecutionState::Running | ExecutionState::Finished | ExecutionState::Canceled => {
                execution.state = transition.execution_state;
            }
            ExecutionState::Failed => {
                execution.state = ExecutionState::Failed;
                execution.failure_info = transition.error.as_ref().map(|cause| ErrorInfo::new(stringify_failure(cause), now));
            }
            ExecutionState::Created | ExecutionState::Scheduled | ExecutionState::Deploying | ExecutionState::Canceling => return false,
        }

        self.check_terminal_state();
        true
    }

    pub fn cancel(&mut self) {
        if self.state.is_terminal_state() || self.state == JobStatus::Cancelling {
            return;
        }
        self.transition_state(JobStatus::Cancelling);
        self.abort_pending_checkpoints(CheckpointFailureReason::CheckpointCoordinatorSuspend);
        self.cancel_executions();
        self.check_terminal_state();
    }

    pub fn fail_job(&mut self, cause: &FailureCause, timestamp: i64) {
        if self.state.is_terminal_state() || self.state == JobStatus::Failing {
            return;
        }
        self.failure_info = Some(ErrorInfo::new(stringify_failure(cause), timestamp));
        self.transition_state(JobStatus::Failing);
        self.abort_pending_checkpoints(CheckpointFailureReason::JobFailover);
        self.cancel_executions();
        self.check_terminal_state();
    }

    /// Stops the graph at once without waiting for the tasks.
    pub fn suspend(&mut self, cause: &FailureCause) {
        if self.state.is_terminal_state() {
            return;
        }
        let now = self.clock.current_time_millis();
        self.failure_info = Some(ErrorInfo::new(stringify_failure(cause), now));
        for execution in self.executions_mut() {
            if !execution.state.is_terminal() {
                execution.state = ExecutionState::Canceled;
            }
        }
        self.checkpoint_coordinator.shutdown();
        self.transition_state(JobStatus::Suspended);
    }

    /// Triggers a checkpoint all current attempts have to acknowledge.
    pub fn trigger_checkpoint(&mut self, properties: CheckpointProperties) -> TriggeredCheckpoint {
        let not_running: Vec<String> = self
            .execution_vertices()
            .filter(|vertex| vertex.current_execution.state != ExecutionState::Running)
            .map(|vertex| vertex.task_name_with_subtask_index.clone())
            .collect();
        if !not_running.is_empty() {
            log::info!("Checkpoint triggering skipped, tasks not running: {}", not_running.join(", "));
            return TriggeredCheckpoint {
                checkpoint_id: None,
                result: failed_future(Error::Checkpoint(CheckpointException::new(CheckpointFailureReason::NotAllRequiredTasksRunning))),
            };
        }

        let attempts = self.execution_vertices().map(|vertex| vertex.current_execution.attempt_id.clone()).collect();
        let now = self.clock.current_time_millis();
        self.checkpoint_coordinator.trigger_checkpoint(properties, attempts, now)
    }

    pub fn acknowledge_checkpoint(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64) -> Option<CheckpointOutcome> {
        let now = self.clock.current_time_millis();
        self.checkpoint_coordinator.receive_acknowledge(attempt, checkpoint_id, now)
    }

    pub fn decline_checkpoint(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64, reason: &str) -> Option<CheckpointOutcome> {
        self.checkpoint_coordinator.receive_decline(attempt, checkpoint_id, reason)
    }

    /// Name and location of the subtask running `attempt`.
    pub fn task_information(&self, attempt: &ExecutionAttemptId) -> Option<(String, Option<TaskManagerLocation>)> {
        let vertex = self.execution_vertex(&attempt.execution_vertex_id)?;
        let location = vertex.current_execution.assigned_slot.as_ref().map(|slot| slot.task_manager.clone());
        Some((vertex.task_name_with_subtask_index.clone(), location))
    }

    /// Where each subtask ran, used to place the next attempt on the same slot.
    pub fn job_allocations_information(&self) -> JobAllocationsInformation {
        let allocations = self
            .execution_vertices()
            .filter_map(|vertex| {
                let slot = vertex.current_execution.assigned_slot.as_ref()?;
                Some((
                    vertex.id.clone(),
                    PreviousAllocation { allocation_id: slot.allocation_id.clone(), task_manager: slot.task_manager.clone() },
                ))
            })
            .collect();
        JobAllocationsInformation::new(allocations)
    }

    /// Every slot the subtasks of this graph occupy.
    pub fn assigned_allocations(&self) -> BTreeSet<AllocationId> {
        self.execution_vertices()
            .filter_map(|vertex| vertex.current_execution.assigned_slot.as_ref().map(|slot| slot.allocation_id.clone()))
            .collect()
    }

    /// The current attempt number of every subtask.
    pub fn current_attempt_numbers(&self) -> Vec<(ExecutionVertexId, u32)> {
        self.execution_vertices().map(|vertex| (vertex.id.clone(), vertex.current_execution.attempt_id.attempt_number)).collect()
    }

    fn transition_state(&mut self, new_state: JobStatus) {
        log::info!("Job {} ({}) switched from state {} to {}.", self.job_name, self.job_id, self.state, new_state);
        self.state = new_state;
        self.state_timestamps.insert(new_state, self.clock.current_time_millis());
    }

    fn current_execution_mut(&mut self, attempt: &ExecutionAttemptId) -> Option<&mut Execution> {
        let vertex_id = &attempt.execution_vertex_id;
        let job_vertex = self.job_vertices.iter_mut().find(|vertex| vertex.id == vertex_id.job_vertex_id)?;
        let execution = &mut job_vertex.task_vertices.get_mut(vertex_id.subtask_index as usize)?.current_execution;
        (execution.attempt_id == *attempt).then_some(execution)
    }

    fn executions_mut(&mut self) -> impl Iterator<Item = &mut Execution> {
        self.job_vertices.iter_mut().flat_map(|vertex| vertex.task_vertices.iter_mut()).map(|vertex| &mut vertex.current_execution)
    }

    /// Undeployed attempts are canceled at once, deployed ones wait for the task's confirmation.
    fn cancel_executions(&mut self) {
        for execution in self.executions_mut() {
            if execution.state.is_terminal() {
                continue;
            }
            execution.state = if execution.state.is_deployed() { ExecutionState::Canceling } else { ExecutionState::Canceled };
        }
    }

    fn abort_pending_checkpoints(&mut self, reason: CheckpointFailureReason) {
        self.checkpoint_coordinator.stop_checkpoint_scheduler();
        let aborted = self.checkpoint_coordinator.abort_pending_checkpoints(reason);
        if !aborted.is_empty() {
            log::info!("Aborted {} pending checkpoints of job {}: {}", aborted.len(), self.job_id, reason);
        }
    }

    fn check_terminal_state(&mut self) {
        let all_terminal = self.execution_vertices().all(|vertex| vertex.current_execution.state.is_terminal());
        let all_finished = self.execution_vertices().all(|vertex| vertex.current_execution.state == ExecutionState::Finished);

        let terminal_state = match self.state {
            JobStatus::Running if all_finished => Some(JobStatus::Finished),
            JobStatus::Cancelling if all_terminal => Some(JobStatus::Canceled),
            JobStatus::Failing if all_terminal => Some(JobStatus::Failed),
            _ => None,
        };

        if let Some(terminal_state) = terminal_state {
            self.checkpoint_coordinator.shutdown();
            self.transition_state(terminal_state);
        }
    }
}

fn max_parallelism_of(job_vertices: &[ExecutionJobVertex]) -> BTreeMap<JobVertexId, u32> {
    job_vertices.iter().map(|vertex| (vertex.id.clone(), vertex.max_parallelism)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::checkpoint_services::CheckpointServices;
    use crate::domain::checkpoint::completed_checkpoint::CheckpointType;
    use crate::domain::clock::clock_mock::ManualClock;
    use crate::domain::failure::error_classification::failure_cause_from_message;
    use crate::domain::job::job_graph::{JobGraph, JobVertex};
    use crate::domain::job::vertex_parallelism::{compute_vertex_parallelism_store, default_max_parallelism_of};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn graph(parallelism: u32) -> ExecutionGraph {
        let mut job_graph = JobGraph::new("job");
        job_graph.add_vertex(JobVertex::new("map", parallelism).with_id(JobVertexId::new("map")));
        let store = compute_vertex_parallelism_store(job_graph.vertices(), default_max_parallelism_of);
        let information = JobGraphJobInformation::new(job_graph.clone(), store.clone());
        let coordinator = CheckpointCoordinator::new(job_graph.job_id.clone(), None, CheckpointServices::standalone(1));
        ExecutionGraph::new(&information, store, &VertexAttemptNumberStore::new(), coordinator, Arc::new(ManualClock::new(0))).unwrap()
    }

    fn running_graph(parallelism: u32) -> ExecutionGraph {
        let mut graph = graph(parallelism);
        let slots = graph
            .execution_vertices()
            .map(|vertex| {
                (
                    vertex.id.clone(),
                    LogicalSlot { allocation_id: AllocationId::random(), task_manager: TaskManagerLocation::new("tm", "localhost") },
                )
            })
            .collect::<HashMap<_, _>>();
        graph.transition_to_running();
        graph.assign_slots(&ReservedSlots::new(slots)).unwrap();
        graph.deploy();
        let attempts: Vec<ExecutionAttemptId> = graph.execution_vertices().map(|vertex| vertex.current_execution.attempt_id.clone()).collect();
        for attempt in attempts {
            assert!(graph.update_state(&TaskExecutionStateTransition::new(attempt, ExecutionState::Running)));
        }
        graph
    }

    fn attempt(subtask: u32, attempt_number: u32) -> ExecutionAttemptId {
        ExecutionAttemptId::new(ExecutionVertexId::new(JobVertexId::new("map"), subtask), attempt_number)
    }

    #[test]
    fn test_graph_has_one_vertex_per_subtask() {
        let graph = graph(3);
        assert_eq!(graph.execution_vertices().count(), 3);
        assert_eq!(graph.job_vertex(&JobVertexId::new("map")).unwrap().parallelism(), 3);
        assert_eq!(graph.state(), JobStatus::Created);
    }

    #[test]
    fn test_stale_attempt_updates_are_rejected() {
        let mut graph = running_graph(1);
        assert!(!graph.update_state(&TaskExecutionStateTransition::new(attempt(0, 7), ExecutionState::Finished)));
        assert!(!graph.update_state(&TaskExecutionStateTransition::new(attempt(5, 0), ExecutionState::Finished)));
    }

    #[test]
    fn test_all_finished_tasks_finish_the_job() {
        let mut graph = running_graph(2);
        graph.update_state(&TaskExecutionStateTransition::new(attempt(0, 0), ExecutionState::Finished));
        assert_eq!(graph.state(), JobStatus::Running);

        graph.update_state(&TaskExecutionStateTransition::new(attempt(1, 0), ExecutionState::Finished));
        assert_eq!(graph.state(), JobStatus::Finished);
    }

    #[test]
    fn test_cancel_waits_for_deployed_tasks() {
        let mut graph = running_graph(2);
        graph.cancel();
        assert_eq!(graph.state(), JobStatus::Cancelling);

        graph.update_state(&TaskExecutionStateTransition::new(attempt(0, 0), ExecutionState::Canceled));
        graph.update_state(&TaskExecutionStateTransition::new(attempt(1, 0), ExecutionState::Canceled));
        assert_eq!(graph.state(), JobStatus::Canceled);
    }

    #[test]
    fn test_cancel_of_undeployed_graph_is_immediate() {
        let mut graph = graph(2);
        graph.transition_to_running();
        graph.cancel();
        assert_eq!(graph.state(), JobStatus::Canceled);
    }

    #[test]
    fn test_fail_job_records_failure() {
        let mut graph = running_graph(1);
        graph.fail_job(&failure_cause_from_message("boom"), 5);
        graph.update_state(&TaskExecutionStateTransition::new(attempt(0, 0), ExecutionState::Canceled));

        assert_eq!(graph.state(), JobStatus::Failed);
        assert_eq!(graph.failure_info().unwrap().exception, "boom");
    }

    #[test]
    fn test_checkpoint_requires_running_tasks() {
        let mut graph = graph(1);
        let triggered = graph.trigger_checkpoint(CheckpointProperties::checkpoint(CheckpointType::Configured));
        assert!(triggered.checkpoint_id.is_none());

        let mut graph = running_graph(1);
        let triggered = graph.trigger_checkpoint(CheckpointProperties::checkpoint(CheckpointType::Configured));
        let id = triggered.checkpoint_id.unwrap();
        assert!(matches!(graph.acknowledge_checkpoint(&attempt(0, 0), id), Some(CheckpointOutcome::Completed(_))));
    }
}
