use std::time::Duration;

use crate::domain::execution::archived_execution_graph::ArchivedExecutionGraph;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::state_transition_manager::DefaultStateTransitionManager;
use crate::domain::scheduler::states::{ResourceListener, TransitionDriver, sparse_archived_execution_graph};

/// Waits until the slot pool can run the job, then creates the execution graph.
///
/// Desired resources lead to an immediate transition. Sufficient resources are used once they
/// were stable for the submission stabilization timeout, or when the resource wait timeout hits.
#[derive(Debug)]
pub struct WaitingForResources {
    state_transition_manager: DefaultStateTransitionManager,
    /// Summary of the last attempt, if there was one.
    previous_execution_graph: Option<ArchivedExecutionGraph>,
}

impl WaitingForResources {
    pub fn new(previous_execution_graph: Option<ArchivedExecutionGraph>, ctx: &mut SchedulerContext) -> Self {
        let mut state_transition_manager =
            DefaultStateTransitionManager::new(Duration::ZERO, ctx.settings.submission_resource_stabilization_timeout, Duration::ZERO, ctx.now());

        let (_, evaluations) = TransitionDriver::drive(&mut state_transition_manager, ctx, None, |manager, driver| manager.start(driver));
        let waiting = WaitingForResources { state_transition_manager, previous_execution_graph };
        waiting.schedule_evaluations(evaluations, ctx);

        if let Some(timeout) = ctx.settings.submission_resource_wait_timeout {
            ctx.run_if_state::<WaitingForResources, _>(timeout, |waiting, ctx| waiting.resource_timeout(ctx));
        }
        ctx.run_if_state::<WaitingForResources, _>(Duration::ZERO, |waiting, ctx| waiting.on_change(ctx));

        waiting
    }

    pub fn archived_execution_graph(&self, ctx: &SchedulerContext) -> ArchivedExecutionGraph {
        match &self.previous_execution_graph {
            Some(previous) => ArchivedExecutionGraph { state: JobStatus::Created, ..previous.clone() },
            None => sparse_archived_execution_graph(JobStatus::Created, None, ctx),
        }
    }

    fn on_change(&mut self, ctx: &mut SchedulerContext) {
        let now = ctx.now();
        let (transition, evaluations) =
            TransitionDriver::drive(&mut self.state_transition_manager, ctx, None, |manager, driver| manager.on_change(driver, now));
        self.apply(transition, evaluations, ctx);
    }

    fn evaluate(&mut self, ctx: &mut SchedulerContext) {
        let now = ctx.now();
        let (transition, evaluations) =
            TransitionDriver::drive(&mut self.state_transition_manager, ctx, None, |manager, driver| manager.evaluate(driver, now));
        self.apply(transition, evaluations, ctx);
    }

    fn resource_timeout(&mut self, ctx: &mut SchedulerContext) {
        log::info!("Resource wait timeout of job {} reached, trying with the available resources.", ctx.job_information.job_id());
        self.create_execution_graph_with_available_resources(ctx);
    }

    fn apply(&mut self, transition: bool, evaluations: Vec<Duration>, ctx: &mut SchedulerContext) {
        if transition {
            self.create_execution_graph_with_available_resources(ctx);
        } else {
            self.schedule_evaluations(evaluations, ctx);
        }
    }

    fn schedule_evaluations(&self, evaluations: Vec<Duration>, ctx: &SchedulerContext) {
        for delay in evaluations {
            ctx.run_if_state::<WaitingForResources, _>(delay, |waiting, ctx| waiting.evaluate(ctx));
        }
    }

    fn create_execution_graph_with_available_resources(&mut self, ctx: &mut SchedulerContext) {
        ctx.go_to_creating_execution_graph(self.previous_execution_graph.take());
    }
}

impl ResourceListener for WaitingForResources {
    fn on_new_resources_available(&mut self, ctx: &mut SchedulerContext) {
        self.on_change(ctx);
    }

    fn on_new_resource_requirements(&mut self, ctx: &mut SchedulerContext) {
        self.on_change(ctx);
    }
}
