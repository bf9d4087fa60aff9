use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::execution::execution_graph::ExecutionGraph;
use crate::domain::execution::execution_state::ExecutionState;
use crate::domain::job::job_graph::JobGraph;
use crate::domain::utils::id::{ExecutionAttemptId, JobId, JobVertexId, OperatorId};
use crate::domain::utils::operation_future::{OperationFuture, failed_future};
use crate::error::{Error, Result};

pub type OperatorEvent = serde_json::Value;
pub type CoordinationRequest = serde_json::Value;
pub type CoordinationResponse = serde_json::Value;

#[derive(Debug, Clone)]
pub struct OperatorCoordinatorContext {
    pub job_id: JobId,
    pub operator_id: OperatorId,
    pub job_vertex_id: JobVertexId,
    pub parallelism: u32,
}

/// Runs next to the scheduler and talks to the subtasks of one operator out of band.
pub trait OperatorCoordinator: Send {
    fn start(&mut self) -> anyhow::Result<()>;

    fn close(&mut self);

    fn handle_event_from_operator(&mut self, subtask: u32, attempt_number: u32, event: OperatorEvent) -> anyhow::Result<()>;

    fn handle_coordination_request(&mut self, request: CoordinationRequest) -> OperationFuture<CoordinationResponse>;

    /// The job was restored from `checkpoint_id`, or starts without state for `None`.
    fn reset_to_checkpoint(&mut self, _checkpoint_id: Option<u64>) {}
}

type CoordinatorFactory = Arc<dyn Fn(&OperatorCoordinatorContext) -> Box<dyn OperatorCoordinator> + Send + Sync>;

/// Creates a fresh coordinator for every execution graph.
#[derive(Clone)]
pub struct OperatorCoordinatorProvider {
    pub operator_id: OperatorId,
    factory: CoordinatorFactory,
}

impl OperatorCoordinatorProvider {
    pub fn new(
        operator_id: OperatorId,
        factory: impl Fn(&OperatorCoordinatorContext) -> Box<dyn OperatorCoordinator> + Send + Sync + 'static,
    ) -> Self {
        OperatorCoordinatorProvider { operator_id, factory: Arc::new(factory) }
    }

    pub fn create(&self, context: &OperatorCoordinatorContext) -> Box<dyn OperatorCoordinator> {
        (self.factory)(context)
    }
}

impl fmt::Debug for OperatorCoordinatorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCoordinatorProvider").field("operator_id", &self.operator_id).finish()
    }
}

struct CoordinatorHolder {
    job_vertex_id: JobVertexId,
    coordinator: Box<dyn OperatorCoordinator>,
}

/// The operator coordinators of one execution graph.
pub struct OperatorCoordinatorHandler {
    coordinators: BTreeMap<OperatorId, CoordinatorHolder>,
    disposed: bool,
}

impl OperatorCoordinatorHandler {
    pub fn new(job_graph: &JobGraph, execution_graph: &ExecutionGraph) -> Self {
        let mut coordinators = BTreeMap::new();
        for vertex in job_graph.vertices() {
            let parallelism = execution_graph.job_vertex(&vertex.id).map(|job_vertex| job_vertex.parallelism()).unwrap_or(vertex.parallelism);
            for provider in &vertex.operator_coordinators {
                let context = OperatorCoordinatorContext {
                    job_id: job_graph.job_id.clone(),
                    operator_id: provider.operator_id.clone(),
                    job_vertex_id: vertex.id.clone(),
                    parallelism,
                };
                coordinators.insert(
                    provider.operator_id.clone(),
                    CoordinatorHolder { job_vertex_id: vertex.id.clone(), coordinator: provider.create(&context) },
                );
            }
        }
        OperatorCoordinatorHandler { coordinators, disposed: false }
    }

    /// Resets every coordinator to the restored checkpoint and starts it.
    pub fn start_all_operator_coordinators(&mut self, restored_checkpoint_id: Option<u64>) -> anyhow::Result<()> {
        for (operator_id, holder) in self.coordinators.iter_mut() {
            holder.coordinator.reset_to_checkpoint(restored_checkpoint_id);
            holder
                .coordinator
                .start()
                .map_err(|e| e.context(format!("Failed to start the operator coordinator of {}", operator_id)))?;
        }
        Ok(())
    }

    pub fn dispose_all_operator_coordinators(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for holder in self.coordinators.values_mut() {
            holder.coordinator.close();
        }
    }

    /// Hands an event of a running subtask to its operator's coordinator.
    pub fn deliver_operator_event_to_coordinator(
        &mut self,
        execution_graph: &ExecutionGraph,
        sender: &ExecutionAttemptId,
        operator_id: &OperatorId,
        event: OperatorEvent,
    ) -> Result<()> {
        let running = execution_graph
            .execution_state_of(sender)
            .is_some_and(|state| state == ExecutionState::Running || state == ExecutionState::Initializing);
        if !running {
            return Err(Error::TaskNotRunning(format!("Task {} is not running, but in state {:?}.", sender, execution_graph.execution_state_of(sender))));
        }

        let holder = self.coordinators.get_mut(operator_id).ok_or_else(|| Error::CoordinatorNotExist(operator_id.clone()))?;
        if holder.job_vertex_id != sender.execution_vertex_id.job_vertex_id {
            return Err(Error::CoordinatorNotExist(operator_id.clone()));
        }

        holder
            .coordinator
            .handle_event_from_operator(sender.execution_vertex_id.subtask_index, sender.attempt_number, event)
            .map_err(|e| Error::OperationFailed(format!("{:#}", e)))
    }

    pub fn deliver_coordination_request_to_coordinator(&mut self, operator_id: &OperatorId, request: CoordinationRequest) -> OperationFuture<CoordinationResponse> {
        match self.coordinators.get_mut(operator_id) {
            Some(holder) => holder.coordinator.handle_coordination_request(request),
            None => failed_future(Error::CoordinatorNotExist(operator_id.clone())),
        }
    }
}

impl fmt::Debug for OperatorCoordinatorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorCoordinatorHandler")
            .field("operators", &self.coordinators.keys().collect::<Vec<_>>())
            .field("disposed", &self.disposed)
            .finish()
    }
}
