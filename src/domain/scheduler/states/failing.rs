use std::time::Duration;

use crate::domain::failure::error_classification::FailureCause;
use crate::domain::failure::failure_enricher::FailureLabels;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::states::state_with_execution_graph::{ExecutionGraphHolder, StateWithExecutionGraph};

/// The job cannot be restarted. Waits for the remaining tasks to stop.
#[derive(Debug)]
pub struct Failing {
    holder: ExecutionGraphHolder,
}

impl Failing {
    pub fn new(mut holder: ExecutionGraphHolder, cause: FailureCause, ctx: &mut SchedulerContext) -> Self {
        holder.graph.fail_job(&cause, ctx.now());
        ctx.run_if_state::<Failing, _>(Duration::ZERO, |failing, ctx| failing.check_terminal(ctx));
        Failing { holder }
    }

    pub fn into_holder(self) -> ExecutionGraphHolder {
        self.holder
    }
}

impl StateWithExecutionGraph for Failing {
    fn holder(&self) -> &ExecutionGraphHolder {
        &self.holder
    }

    fn holder_mut(&mut self) -> &mut ExecutionGraphHolder {
        &mut self.holder
    }

    fn on_failure(&mut self, cause: FailureCause, _labels: FailureLabels, _ctx: &mut SchedulerContext) {
        log::debug!("Failure while failing, recorded as concurrent failure: {:#}", cause);
    }

    fn on_globally_terminal_state(&mut self, status: JobStatus, ctx: &mut SchedulerContext) {
        let archived = self.holder.archive(status, ctx);
        ctx.go_to_finished(archived);
    }
}
