use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::allocator::slot_allocator::VertexParallelism;
use crate::domain::checkpoint::checkpoint_coordinator::{CheckpointOutcome, external_pointer_of};
use crate::domain::checkpoint::checkpoint_exception::{CheckpointException, CheckpointFailureReason};
use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, CheckpointType, CompletedCheckpoint, SavepointFormatType};
use crate::domain::failure::error_classification::FailureCause;
use crate::domain::failure::failure_enricher::FailureLabels;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::state_transition_manager::DefaultStateTransitionManager;
use crate::domain::scheduler::states::state_with_execution_graph::{ExecutionGraphHolder, StateWithExecutionGraph, restart_or_fail};
use crate::domain::scheduler::states::{CheckpointStatsReceiver, ResourceListener, TransitionDriver};
use crate::domain::utils::operation_future::{OperationFuture, failed_future, operation_future};
use crate::error::Error;

/// The job is running. Watches resources and checkpoints to decide when to rescale.
#[derive(Debug)]
pub struct Executing {
    holder: ExecutionGraphHolder,
    state_transition_manager: DefaultStateTransitionManager,
    failed_checkpoint_count: u32,
    /// Savepoint after which the job is canceled.
    cancel_after_savepoint: Option<u64>,
}

impl Executing {
    pub fn new(mut holder: ExecutionGraphHolder, ctx: &mut SchedulerContext) -> Self {
        holder.graph.deploy();

        let coordinator = holder.graph.checkpoint_coordinator_mut();
        if coordinator.is_periodic_checkpointing_configured() {
            coordinator.start_checkpoint_scheduler();
            if let Some(interval) = coordinator.checkpoint_interval() {
                ctx.run_if_state::<Executing, _>(interval, move |executing, ctx| executing.trigger_periodic_checkpoint(interval, ctx));
            }
        }

        let settings = &ctx.settings;
        let mut state_transition_manager = DefaultStateTransitionManager::new(
            settings.executing_cooldown_timeout,
            settings.executing_resource_stabilization_timeout,
            settings.maximum_delay_for_triggering_rescale,
            ctx.now(),
        );
        let (_, evaluations) = TransitionDriver::drive(&mut state_transition_manager, ctx, None, |manager, driver| manager.start(driver));

        let executing = Executing { holder, state_transition_manager, failed_checkpoint_count: 0, cancel_after_savepoint: None };
        executing.schedule_evaluations(evaluations, ctx);

        // Resources may have changed while the graph was being created.
        ctx.run_if_state::<Executing, _>(Duration::ZERO, |executing, ctx| {
            executing.check_terminal(ctx);
            if ctx.pending_transition.is_none() {
                executing.on_change(ctx);
            }
            if ctx.pending_transition.is_none() {
                executing.on_trigger(ctx);
            }
        });

        executing
    }

    pub fn into_holder(self) -> ExecutionGraphHolder {
        self.holder
    }

    pub fn cancel(&mut self, ctx: &mut SchedulerContext) {
        ctx.go_to_canceling();
    }

    pub fn trigger_checkpoint(&mut self, checkpoint_type: CheckpointType) -> OperationFuture<CompletedCheckpoint> {
        if let Some(blocked) = self.reject_blocking_output() {
            return blocked;
        }
        self.holder.graph.trigger_checkpoint(CheckpointProperties::checkpoint(checkpoint_type)).result
    }

    pub fn trigger_savepoint(&mut self, target_directory: Option<String>, cancel_job: bool, format: SavepointFormatType) -> OperationFuture<String> {
        if let Some(blocked) = self.reject_blocking_output() {
            return external_pointer_of(blocked);
        }

        let coordinator = self.holder.graph.checkpoint_coordinator_mut();
        if cancel_job {
            coordinator.stop_checkpoint_scheduler();
        }
        let triggered = self.holder.graph.trigger_checkpoint(CheckpointProperties::savepoint(format, target_directory));
        if cancel_job {
            match triggered.checkpoint_id {
                Some(checkpoint_id) => self.cancel_after_savepoint = Some(checkpoint_id),
                None => self.holder.graph.checkpoint_coordinator_mut().start_checkpoint_scheduler(),
            }
        }
        external_pointer_of(triggered.result)
    }

    pub fn stop_with_savepoint(
        &mut self,
        target_directory: Option<String>,
        terminate: bool,
        format: SavepointFormatType,
        ctx: &mut SchedulerContext,
    ) -> OperationFuture<String> {
        if let Some(blocked) = self.reject_blocking_output() {
            return external_pointer_of(blocked);
        }
        let (completer, future) = operation_future();
        ctx.go_to_stop_with_savepoint(target_directory, terminate, format, completer);
        future
    }

    fn reject_blocking_output(&self) -> Option<OperationFuture<CompletedCheckpoint>> {
        self.holder.graph.is_any_output_blocking().then(|| {
            failed_future(Error::Checkpoint(CheckpointException::with_detail(
                "Checkpointing is not possible while any output is blocking.",
                CheckpointFailureReason::BlockingOutputExist,
            )))
        })
    }

    fn trigger_periodic_checkpoint(&mut self, interval: Duration, ctx: &mut SchedulerContext) {
        if !self.holder.graph.checkpoint_coordinator().is_periodic_checkpointing_started() {
            return;
        }
        if self.reject_blocking_output().is_none() {
            let triggered = self.holder.graph.trigger_checkpoint(CheckpointProperties::checkpoint(CheckpointType::Configured));
            if triggered.checkpoint_id.is_some() {
                log::debug!("Triggered periodic checkpoint of job {}.", ctx.job_information.job_id());
            }
        }
        ctx.run_if_state::<Executing, _>(interval, move |executing, ctx| executing.trigger_periodic_checkpoint(interval, ctx));
    }

    fn current_parallelism(&self) -> VertexParallelism {
        let parallelism: BTreeMap<_, _> = self.holder.graph.job_vertices().iter().map(|vertex| (vertex.id.clone(), vertex.parallelism())).collect();
        VertexParallelism::new(parallelism)
    }

    fn on_change(&mut self, ctx: &mut SchedulerContext) {
        let now = ctx.now();
        let current = Some(self.current_parallelism());
        let (transition, evaluations) =
            TransitionDriver::drive(&mut self.state_transition_manager, ctx, current, |manager, driver| manager.on_change(driver, now));
        self.apply(transition, evaluations, ctx);
    }

    fn on_trigger(&mut self, ctx: &mut SchedulerContext) {
        let current = Some(self.current_parallelism());
        let (transition, evaluations) =
            TransitionDriver::drive(&mut self.state_transition_manager, ctx, current, |manager, driver| manager.on_trigger(driver));
        self.apply(transition, evaluations, ctx);
    }

    fn evaluate(&mut self, ctx: &mut SchedulerContext) {
        let now = ctx.now();
        let current = Some(self.current_parallelism());
        let (transition, evaluations) =
            TransitionDriver::drive(&mut self.state_transition_manager, ctx, current, |manager, driver| manager.evaluate(driver, now));
        self.apply(transition, evaluations, ctx);
    }

    fn apply(&mut self, transition: bool, evaluations: Vec<Duration>, ctx: &mut SchedulerContext) {
        if transition {
            self.rescale(ctx);
        } else {
            self.schedule_evaluations(evaluations, ctx);
        }
    }

    fn schedule_evaluations(&self, evaluations: Vec<Duration>, ctx: &SchedulerContext) {
        for delay in evaluations {
            ctx.run_if_state::<Executing, _>(delay, |executing, ctx| executing.evaluate(ctx));
        }
    }

    fn rescale(&mut self, ctx: &mut SchedulerContext) {
        log::info!(
            "Rescaling job {}: the available resources allow a different parallelism than {:?}.",
            ctx.job_information.job_id(),
            self.current_parallelism()
        );
        ctx.go_to_restarting(Duration::ZERO);
    }
}

impl StateWithExecutionGraph for Executing {
    fn holder(&self) -> &ExecutionGraphHolder {
        &self.holder
    }

    fn holder_mut(&mut self) -> &mut ExecutionGraphHolder {
        &mut self.holder
    }

    fn on_failure(&mut self, cause: FailureCause, labels: FailureLabels, ctx: &mut SchedulerContext) {
        let failure_result = ctx.how_to_handle_failure(&cause, labels);
        restart_or_fail(failure_result, ctx);
    }

    fn on_globally_terminal_state(&mut self, status: JobStatus, ctx: &mut SchedulerContext) {
        let archived = self.holder.archive(status, ctx);
        ctx.go_to_finished(archived);
    }

    fn on_checkpoint_outcome(&mut self, outcome: CheckpointOutcome, ctx: &mut SchedulerContext) {
        if self.cancel_after_savepoint != Some(outcome.checkpoint_id()) {
            return;
        }
        self.cancel_after_savepoint = None;
        match outcome {
            CheckpointOutcome::Completed(_) => {
                log::info!("Savepoint of job {} completed, canceling the job.", ctx.job_information.job_id());
                self.cancel(ctx);
            }
            CheckpointOutcome::Failed { .. } => {
                self.holder.graph.checkpoint_coordinator_mut().start_checkpoint_scheduler();
            }
        }
    }
}

impl ResourceListener for Executing {
    fn on_new_resources_available(&mut self, ctx: &mut SchedulerContext) {
        self.on_change(ctx);
    }

    fn on_new_resource_requirements(&mut self, ctx: &mut SchedulerContext) {
        self.on_change(ctx);
    }
}

impl CheckpointStatsReceiver for Executing {
    fn on_completed_checkpoint(&mut self, ctx: &mut SchedulerContext) {
        self.failed_checkpoint_count = 0;
        self.on_trigger(ctx);
    }

    fn on_failed_checkpoint(&mut self, ctx: &mut SchedulerContext) {
        self.failed_checkpoint_count += 1;
        if self.failed_checkpoint_count >= ctx.settings.rescale_on_failed_checkpoint_count {
            self.failed_checkpoint_count = 0;
            self.on_trigger(ctx);
        }
    }
}
