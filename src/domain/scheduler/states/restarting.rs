use std::time::Duration;

use crate::domain::clock::clock::add_millis;
use crate::domain::failure::error_classification::FailureCause;
use crate::domain::failure::failure_enricher::FailureLabels;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::states::state_with_execution_graph::{ExecutionGraphHolder, StateWithExecutionGraph};

/// Cancels the current attempt and waits out the backoff before scheduling again.
#[derive(Debug)]
pub struct Restarting {
    holder: ExecutionGraphHolder,
    backoff_deadline: i64,
}

impl Restarting {
    pub fn new(mut holder: ExecutionGraphHolder, backoff_time: Duration, ctx: &mut SchedulerContext) -> Self {
        holder.graph.cancel();
        let backoff_deadline = add_millis(ctx.now(), backoff_time);

        ctx.run_if_state::<Restarting, _>(backoff_time, |restarting, ctx| restarting.go_to_subsequent_state_if_possible(ctx));
        ctx.run_if_state::<Restarting, _>(Duration::ZERO, |restarting, ctx| restarting.check_terminal(ctx));

        Restarting { holder, backoff_deadline }
    }

    pub fn into_holder(self) -> ExecutionGraphHolder {
        self.holder
    }

    fn go_to_subsequent_state_if_possible(&mut self, ctx: &mut SchedulerContext) {
        let canceled = self.holder.graph.state().is_globally_terminal_state();
        if canceled && ctx.now() >= self.backoff_deadline {
            let archived = self.holder.archive(JobStatus::Restarting, ctx);
            ctx.go_to_waiting_for_resources(Some(archived));
        }
    }
}

impl StateWithExecutionGraph for Restarting {
    fn holder(&self) -> &ExecutionGraphHolder {
        &self.holder
    }

    fn holder_mut(&mut self) -> &mut ExecutionGraphHolder {
        &mut self.holder
    }

    fn on_failure(&mut self, cause: FailureCause, _labels: FailureLabels, _ctx: &mut SchedulerContext) {
        log::debug!("Failure while restarting, recorded as concurrent failure: {:#}", cause);
    }

    fn on_globally_terminal_state(&mut self, status: JobStatus, ctx: &mut SchedulerContext) {
        if status != JobStatus::Canceled {
            log::warn!("Execution graph of a restarting job reached {} instead of CANCELED.", status);
        }
        self.go_to_subsequent_state_if_possible(ctx);
    }
}
