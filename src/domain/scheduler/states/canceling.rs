use std::time::Duration;

use crate::domain::failure::error_classification::FailureCause;
use crate::domain::failure::failure_enricher::FailureLabels;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::states::state_with_execution_graph::{ExecutionGraphHolder, StateWithExecutionGraph};

/// Waits for every task to acknowledge the cancellation.
#[derive(Debug)]
pub struct Canceling {
    holder: ExecutionGraphHolder,
}

impl Canceling {
    pub fn new(mut holder: ExecutionGraphHolder, ctx: &mut SchedulerContext) -> Self {
        holder.graph.cancel();
        ctx.run_if_state::<Canceling, _>(Duration::ZERO, |canceling, ctx| canceling.check_terminal(ctx));
        Canceling { holder }
    }

    pub fn into_holder(self) -> ExecutionGraphHolder {
        self.holder
    }
}

impl StateWithExecutionGraph for Canceling {
    fn holder(&self) -> &ExecutionGraphHolder {
        &self.holder
    }

    fn holder_mut(&mut self) -> &mut ExecutionGraphHolder {
        &mut self.holder
    }

    fn on_failure(&mut self, cause: FailureCause, _labels: FailureLabels, _ctx: &mut SchedulerContext) {
        log::debug!("Ignoring failure while canceling: {:#}", cause);
    }

    fn on_globally_terminal_state(&mut self, status: JobStatus, ctx: &mut SchedulerContext) {
        let archived = self.holder.archive(status, ctx);
        ctx.go_to_finished(archived);
    }
}
