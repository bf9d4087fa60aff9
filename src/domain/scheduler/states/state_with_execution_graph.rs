use std::fmt;

use crate::domain::checkpoint::checkpoint_coordinator::CheckpointOutcome;
use crate::domain::execution::archived_execution_graph::ArchivedExecutionGraph;
use crate::domain::execution::execution_graph::ExecutionGraph;
use crate::domain::execution::execution_state::{ExecutionState, TaskExecutionStateTransition};
use crate::domain::execution::operator_coordinator::{CoordinationRequest, CoordinationResponse, OperatorCoordinatorHandler, OperatorEvent};
use crate::domain::failure::error_classification::{FailureCause, failure_cause_from_message};
use crate::domain::failure::exception_history::ExceptionHistoryEntry;
use crate::domain::failure::failure_enricher::{FailureLabels, FailureType};
use crate::domain::failure::failure_result::FailureResult;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::utils::id::{ExecutionAttemptId, OperatorId};
use crate::domain::utils::operation_future::OperationFuture;
use crate::error::Result;

/// The execution graph and what belongs to it. Moves from state to state.
pub struct ExecutionGraphHolder {
    pub graph: ExecutionGraph,
    pub operator_coordinator_handler: OperatorCoordinatorHandler,
    /// Failures of the current attempt, archived when the graph is given up.
    pub failure_collection: Vec<ExceptionHistoryEntry>,
}

impl ExecutionGraphHolder {
    pub fn new(graph: ExecutionGraph, operator_coordinator_handler: OperatorCoordinatorHandler) -> Self {
        ExecutionGraphHolder { graph, operator_coordinator_handler, failure_collection: Vec::new() }
    }

    pub fn archive(&self, status: JobStatus, ctx: &SchedulerContext) -> ArchivedExecutionGraph {
        ArchivedExecutionGraph::from_execution_graph_with_state(
            &self.graph,
            status,
            Some(ctx.checkpoint_services.checkpoint_stats_tracker.create_snapshot()),
        )
    }

    /// Gives up the graph: archives its failures, closes the coordinators and returns its slots.
    pub fn release(&mut self, ctx: &mut SchedulerContext) {
        if !self.graph.state().is_terminal_state() {
            self.graph.suspend(&failure_cause_from_message("The execution graph was given up by the scheduler."));
        }
        ctx.archive_failures(std::mem::take(&mut self.failure_collection));
        self.operator_coordinator_handler.dispose_all_operator_coordinators();
        ctx.previous_allocations = self.graph.job_allocations_information();
        ctx.free_slots(self.graph.assigned_allocations());
    }
}

impl fmt::Debug for ExecutionGraphHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGraphHolder")
            .field("job_status", &self.graph.state())
            .field("failures", &self.failure_collection.len())
            .finish()
    }
}

/// Behaviour shared by every state that owns an execution graph.
pub trait StateWithExecutionGraph {
    fn holder(&self) -> &ExecutionGraphHolder;

    fn holder_mut(&mut self) -> &mut ExecutionGraphHolder;

    /// A task or the whole job failed. The failure is already in the failure collection.
    fn on_failure(&mut self, cause: FailureCause, labels: FailureLabels, ctx: &mut SchedulerContext);

    fn on_globally_terminal_state(&mut self, status: JobStatus, ctx: &mut SchedulerContext);

    fn on_checkpoint_outcome(&mut self, _outcome: CheckpointOutcome, _ctx: &mut SchedulerContext) {}

    /// Applies a task status report. Returns `false` for reports the graph does not know.
    fn update_task_execution_state(&mut self, transition: TaskExecutionStateTransition, ctx: &mut SchedulerContext) -> bool {
        let updated = self.holder_mut().graph.update_state(&transition);
        if !updated {
            log::debug!("Ignoring status {} of unknown or outdated attempt {}.", transition.execution_state, transition.attempt_id);
            return false;
        }

        if transition.execution_state == ExecutionState::Failed {
            let cause = transition
                .error
                .clone()
                .unwrap_or_else(|| failure_cause_from_message(format!("Task {} failed without a reported cause.", transition.attempt_id)));
            let labels = ctx.label_failure(&cause, FailureType::Task);
            let (task_name, location) = self
                .holder()
                .graph
                .task_information(&transition.attempt_id)
                .unwrap_or_else(|| (transition.attempt_id.to_string(), None));

            log::info!("Task {} failed: {:#}", task_name, cause);
            let entry = ExceptionHistoryEntry::from_failed_execution(&cause, ctx.now(), labels.clone(), task_name, location);
            self.holder_mut().failure_collection.push(entry);
            self.on_failure(cause, labels, ctx);
        }

        if ctx.pending_transition.is_none() {
            self.check_terminal(ctx);
        }
        true
    }

    fn handle_global_failure(&mut self, cause: FailureCause, labels: FailureLabels, ctx: &mut SchedulerContext) {
        log::info!("Job {} failed globally: {:#}", ctx.job_information.job_id(), cause);
        let entry = ExceptionHistoryEntry::from_global_failure(&cause, ctx.now(), labels.clone());
        self.holder_mut().failure_collection.push(entry);
        self.on_failure(cause, labels, ctx);
    }

    fn check_terminal(&mut self, ctx: &mut SchedulerContext) {
        let status = self.holder().graph.state();
        if status.is_globally_terminal_state() {
            self.on_globally_terminal_state(status, ctx);
        }
    }

    fn acknowledge_checkpoint(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64, ctx: &mut SchedulerContext) {
        if let Some(outcome) = self.holder_mut().graph.acknowledge_checkpoint(attempt, checkpoint_id) {
            self.on_checkpoint_outcome(outcome, ctx);
        }
    }

    fn decline_checkpoint(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64, reason: &str, ctx: &mut SchedulerContext) {
        if let Some(outcome) = self.holder_mut().graph.decline_checkpoint(attempt, checkpoint_id, reason) {
            self.on_checkpoint_outcome(outcome, ctx);
        }
    }

    fn deliver_operator_event_to_coordinator(&mut self, sender: &ExecutionAttemptId, operator_id: &OperatorId, event: OperatorEvent) -> Result<()> {
        let holder = self.holder_mut();
        holder.operator_coordinator_handler.deliver_operator_event_to_coordinator(&holder.graph, sender, operator_id, event)
    }

    fn deliver_coordination_request_to_coordinator(&mut self, operator_id: &OperatorId, request: CoordinationRequest) -> OperationFuture<CoordinationResponse> {
        self.holder_mut().operator_coordinator_handler.deliver_coordination_request_to_coordinator(operator_id, request)
    }
}

/// Restarts after the backoff if the failure allows it, fails the job otherwise.
pub fn restart_or_fail(failure_result: FailureResult, ctx: &mut SchedulerContext) {
    match failure_result {
        FailureResult::CanRestart { backoff_time, .. } => {
            log::info!("Restarting job {} in {:?}.", ctx.job_information.job_id(), backoff_time);
            ctx.go_to_restarting(backoff_time);
        }
        FailureResult::CanNotRestart { cause, reason, .. } => {
            log::info!("Failing job {}: {}", ctx.job_information.job_id(), reason);
            ctx.go_to_failing(cause);
        }
    }
}
