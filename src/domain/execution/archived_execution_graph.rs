use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::checkpoint::checkpoint_stats_tracker::CheckpointStatsSnapshot;
use crate::domain::execution::execution_graph::ExecutionGraph;
use crate::domain::execution::execution_state::ExecutionState;
use crate::domain::failure::error_classification::{FailureCause, stringify_failure};
use crate::domain::failure::exception_history::RootExceptionHistoryEntry;
use crate::domain::job::job_graph::{JobGraph, JobType};
use crate::domain::job::job_status::JobStatus;
use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::domain::utils::id::{ExecutionVertexId, JobId, JobVertexId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub exception: String,
    pub timestamp: i64,
}

impl ErrorInfo {
    pub fn new(exception: impl Into<String>, timestamp: i64) -> Self {
        ErrorInfo { exception: exception.into(), timestamp }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedExecutionVertex {
    pub id: ExecutionVertexId,
    pub task_name_with_subtask_index: String,
    pub attempt_number: u32,
    pub state: ExecutionState,
    pub task_manager_host: Option<String>,
    pub failure_info: Option<ErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedExecutionJobVertex {
    pub id: JobVertexId,
    pub name: String,
    pub parallelism: u32,
    pub max_parallelism: u32,
    pub task_vertices: Vec<ArchivedExecutionVertex>,
}

/// Immutable summary of a job's execution, safe to hand out of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedExecutionGraph {
    pub job_id: JobId,
    pub job_name: String,
    pub job_type: JobType,
    pub state: JobStatus,
    pub state_timestamps: BTreeMap<JobStatus, i64>,
    pub failure_info: Option<ErrorInfo>,
    pub job_vertices: Vec<ArchivedExecutionJobVertex>,
    pub checkpoint_stats: Option<CheckpointStatsSnapshot>,
}

impl ArchivedExecutionGraph {
    /// Archives `graph` reporting `state` as the job status, which may differ from the graph's own.
    pub fn from_execution_graph_with_state(graph: &ExecutionGraph, state: JobStatus, checkpoint_stats: Option<CheckpointStatsSnapshot>) -> Self {
        let job_vertices = graph
            .job_vertices()
            .iter()
            .map(|job_vertex| ArchivedExecutionJobVertex {
                id: job_vertex.id.clone(),
                name: job_vertex.name.clone(),
                parallelism: job_vertex.parallelism(),
                max_parallelism: job_vertex.max_parallelism,
                task_vertices: job_vertex
                    .task_vertices
                    .iter()
                    .map(|vertex| ArchivedExecutionVertex {
                        id: vertex.id.clone(),
                        task_name_with_subtask_index: vertex.task_name_with_subtask_index.clone(),
                        attempt_number: vertex.current_execution.attempt_id.attempt_number,
                        state: vertex.current_execution.state,
                        task_manager_host: vertex.current_execution.assigned_slot.as_ref().map(|slot| slot.task_manager.host.clone()),
                        failure_info: vertex.current_execution.failure_info.clone(),
                    })
                    .collect(),
            })
            .collect();

        ArchivedExecutionGraph {
            job_id: graph.job_id().clone(),
            job_name: graph.job_name().to_string(),
            job_type: graph.job_type(),
            state,
            state_timestamps: graph.state_timestamps().clone(),
            failure_info: graph.failure_info().cloned(),
            job_vertices,
            checkpoint_stats,
        }
    }

    /// Summary for states without an execution graph. Job vertices carry no subtasks.
    pub fn create_sparse(
        job_graph: &JobGraph,
        state: JobStatus,
        failure: Option<(&FailureCause, i64)>,
        parallelism_store: &VertexParallelismStore,
        initialization_timestamp: i64,
        checkpoint_stats: Option<CheckpointStatsSnapshot>,
    ) -> Self {
        let job_vertices = job_graph
            .vertices()
            .iter()
            .map(|vertex| {
                let info = parallelism_store.get_parallelism_info(&vertex.id);
                ArchivedExecutionJobVertex {
                    id: vertex.id.clone(),
                    name: vertex.name.clone(),
                    parallelism: info.map(|info| info.parallelism()).unwrap_or(vertex.parallelism),
                    max_parallelism: info.map(|info| info.max_parallelism()).unwrap_or_default(),
                    task_vertices: Vec::new(),
                }
            })
            .collect();

        let mut state_timestamps = BTreeMap::from([(JobStatus::Initializing, initialization_timestamp)]);
        if state != JobStatus::Initializing {
            state_timestamps.insert(state, initialization_timestamp);
        }

        ArchivedExecutionGraph {
            job_id: job_graph.job_id.clone(),
            job_name: job_graph.name.clone(),
            job_type: job_graph.job_type,
            state,
            state_timestamps,
            failure_info: failure.map(|(cause, timestamp)| ErrorInfo::new(stringify_failure(cause), timestamp)),
            job_vertices,
            checkpoint_stats,
        }
    }

    pub fn status_timestamp(&self, status: JobStatus) -> Option<i64> {
        self.state_timestamps.get(&status).copied()
    }
}

/// The archived graph together with the failures the job went through.
#[derive(Debug, Clone)]
pub struct ExecutionGraphInfo {
    pub archived_execution_graph: ArchivedExecutionGraph,
    pub exception_history: Vec<RootExceptionHistoryEntry>,
}

impl ExecutionGraphInfo {
    pub fn new(archived_execution_graph: ArchivedExecutionGraph, exception_history: Vec<RootExceptionHistoryEntry>) -> Self {
        ExecutionGraphInfo { archived_execution_graph, exception_history }
    }

    pub fn job_id(&self) -> &JobId {
        &self.archived_execution_graph.job_id
    }

    pub fn exception_history(&self) -> &[RootExceptionHistoryEntry] {
        &self.exception_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::failure::error_classification::failure_cause_from_message;
    use crate::domain::job::job_graph::JobVertex;
    use crate::domain::job::vertex_parallelism::{compute_vertex_parallelism_store, default_max_parallelism_of};

    #[test]
    fn test_sparse_graph_keeps_failure_and_parallelism() {
        let mut job_graph = JobGraph::new("job");
        let vertex = job_graph.add_vertex(JobVertex::new("map", 3));
        let store = compute_vertex_parallelism_store(job_graph.vertices(), default_max_parallelism_of);
        let cause = failure_cause_from_message("no resources");

        let archived = ArchivedExecutionGraph::create_sparse(&job_graph, JobStatus::Failed, Some((&cause, 7)), &store, 3, None);

        assert_eq!(archived.state, JobStatus::Failed);
        assert_eq!(archived.failure_info, Some(ErrorInfo::new("no resources", 7)));
        assert_eq!(archived.job_vertices[0].id, vertex);
        assert_eq!(archived.job_vertices[0].parallelism, 3);
        assert_eq!(archived.status_timestamp(JobStatus::Initializing), Some(3));
    }
}
