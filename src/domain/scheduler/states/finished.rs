use crate::domain::execution::archived_execution_graph::ArchivedExecutionGraph;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;

/// Terminal state. Keeps the final summary of the job and ignores every request.
#[derive(Debug)]
pub struct Finished {
    archived_execution_graph: ArchivedExecutionGraph,
}

impl Finished {
    pub fn new(archived_execution_graph: ArchivedExecutionGraph, ctx: &mut SchedulerContext) -> Self {
        let status = archived_execution_graph.state;
        log::info!("Job {} reached terminal state {}.", archived_execution_graph.job_id, status);
        ctx.complete_job_termination(status);
        Finished { archived_execution_graph }
    }

    pub fn job_status(&self) -> JobStatus {
        self.archived_execution_graph.state
    }

    pub fn archived_execution_graph(&self) -> &ArchivedExecutionGraph {
        &self.archived_execution_graph
    }
}
