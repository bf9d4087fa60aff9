use std::time::Duration;

use futures::FutureExt;

use crate::domain::checkpoint::checkpoint_coordinator::CheckpointOutcome;
use crate::domain::checkpoint::checkpoint_exception::CheckpointException;
use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, SavepointFormatType};
use crate::domain::failure::error_classification::FailureCause;
use crate::domain::failure::failure_enricher::FailureLabels;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::states::state_with_execution_graph::{ExecutionGraphHolder, StateWithExecutionGraph, restart_or_fail};
use crate::domain::utils::operation_future::OperationCompleter;
use crate::error::Error;

/// Takes a synchronous savepoint and then waits for the job to finish.
#[derive(Debug)]
pub struct StopWithSavepoint {
    holder: ExecutionGraphHolder,
    completer: Option<OperationCompleter<String>>,
    savepoint_id: Option<u64>,
    savepoint_path: Option<String>,
}

impl StopWithSavepoint {
    pub fn new(
        mut holder: ExecutionGraphHolder,
        target_directory: Option<String>,
        terminate: bool,
        format: SavepointFormatType,
        completer: OperationCompleter<String>,
        ctx: &mut SchedulerContext,
    ) -> Self {
        holder.graph.checkpoint_coordinator_mut().stop_checkpoint_scheduler();
        let triggered = holder.graph.trigger_checkpoint(CheckpointProperties::synchronous_savepoint(format, terminate, target_directory));

        if triggered.checkpoint_id.is_none() {
            let error = match triggered.result.now_or_never() {
                Some(Err(error)) => error,
                _ => Error::OperationFailed("The savepoint could not be triggered.".to_string()),
            };
            ctx.run_if_state::<StopWithSavepoint, _>(Duration::ZERO, move |stop, ctx| stop.on_savepoint_failure(error, ctx));
        } else {
            log::info!("Triggered stop-with-savepoint {:?} of job {}.", triggered.checkpoint_id, ctx.job_information.job_id());
        }

        StopWithSavepoint { holder, completer: Some(completer), savepoint_id: triggered.checkpoint_id, savepoint_path: None }
    }

    pub fn into_holder(self) -> ExecutionGraphHolder {
        self.holder
    }

    pub fn cancel(&mut self, ctx: &mut SchedulerContext) {
        self.fail_operation(Error::OperationFailed("Stop with savepoint was canceled because the job was canceled.".to_string()));
        ctx.go_to_canceling();
    }

    pub fn suspend(&mut self, cause: FailureCause, ctx: &mut SchedulerContext) {
        self.fail_operation(Error::OperationFailed(format!("Stop with savepoint was aborted because the job was suspended: {:#}", cause)));
        self.holder.graph.suspend(&cause);
        let archived = self.holder.archive(JobStatus::Suspended, ctx);
        ctx.go_to_finished(archived);
    }

    pub fn on_leave(&mut self) {
        self.fail_operation(Error::OperationFailed("Stop with savepoint did not complete before the state was left.".to_string()));
    }

    fn on_savepoint_failure(&mut self, error: Error, ctx: &mut SchedulerContext) {
        log::warn!("Stop-with-savepoint of job {} failed, resuming the job: {}", ctx.job_information.job_id(), error);
        self.holder.graph.checkpoint_coordinator_mut().start_checkpoint_scheduler();
        self.fail_operation(error);
        ctx.go_to_executing(None);
    }

    fn fail_operation(&mut self, error: Error) {
        if let Some(completer) = self.completer.take() {
            completer.fail(error);
        }
    }
}

impl StateWithExecutionGraph for StopWithSavepoint {
    fn holder(&self) -> &ExecutionGraphHolder {
        &self.holder
    }

    fn holder_mut(&mut self) -> &mut ExecutionGraphHolder {
        &mut self.holder
    }

    fn on_failure(&mut self, cause: FailureCause, labels: FailureLabels, ctx: &mut SchedulerContext) {
        self.fail_operation(Error::OperationFailed(format!("A task failed during stop-with-savepoint: {:#}", cause)));
        let failure_result = ctx.how_to_handle_failure(&cause, labels);
        restart_or_fail(failure_result, ctx);
    }

    fn on_globally_terminal_state(&mut self, status: JobStatus, ctx: &mut SchedulerContext) {
        match (status, self.savepoint_path.take()) {
            (JobStatus::Finished, Some(path)) => {
                if let Some(completer) = self.completer.take() {
                    completer.complete(path);
                }
            }
            (status, _) => {
                self.fail_operation(Error::OperationFailed(format!("The job reached {} before the savepoint completed.", status)));
            }
        }
        let archived = self.holder.archive(status, ctx);
        ctx.go_to_finished(archived);
    }

    fn on_checkpoint_outcome(&mut self, outcome: CheckpointOutcome, ctx: &mut SchedulerContext) {
        if self.savepoint_id != Some(outcome.checkpoint_id()) {
            return;
        }
        match outcome {
            CheckpointOutcome::Completed(checkpoint) => {
                log::info!("Savepoint {} of job {} completed, waiting for the job to finish.", checkpoint.external_pointer, checkpoint.job_id);
                self.savepoint_path = Some(checkpoint.external_pointer);
                self.check_terminal(ctx);
            }
            CheckpointOutcome::Failed { reason, .. } => {
                self.on_savepoint_failure(Error::Checkpoint(CheckpointException::new(reason)), ctx);
            }
        }
    }
}
