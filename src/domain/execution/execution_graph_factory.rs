use async_trait::async_trait;

use crate::domain::checkpoint::checkpoint_coordinator::CheckpointCoordinator;
use crate::domain::checkpoint::checkpoint_services::CheckpointServices;
use crate::domain::clock::clock::SharedClock;
use crate::domain::execution::execution_graph::ExecutionGraph;
use crate::domain::execution::vertex_attempt_number_store::VertexAttemptNumberStore;
use crate::domain::job::job_information::JobGraphJobInformation;
use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::error::Result;

/// Everything needed to build the execution graph of one scheduling attempt.
#[derive(Debug, Clone)]
pub struct ExecutionGraphCreationRequest {
    pub job_information: JobGraphJobInformation,
    /// Store whose parallelism is the one chosen for this attempt.
    pub parallelism_store: VertexParallelismStore,
    pub attempt_numbers: VertexAttemptNumberStore,
    pub checkpoint_services: CheckpointServices,
}

/// Builds execution graphs and restores their state. Runs on the I/O executor.
#[async_trait]
pub trait ExecutionGraphFactory: Send + Sync {
    async fn create_and_restore_execution_graph(&self, request: ExecutionGraphCreationRequest) -> Result<ExecutionGraph>;
}

#[derive(Debug)]
pub struct DefaultExecutionGraphFactory {
    clock: SharedClock,
}

impl DefaultExecutionGraphFactory {
    pub fn new(clock: SharedClock) -> Self {
        DefaultExecutionGraphFactory { clock }
    }
}

#[async_trait]
impl ExecutionGraphFactory for DefaultExecutionGraphFactory {
    async fn create_and_restore_execution_graph(&self, request: ExecutionGraphCreationRequest) -> Result<ExecutionGraph> {
        let job_graph = request.job_information.job_graph();
        let checkpoint_coordinator = CheckpointCoordinator::new(job_graph.job_id.clone(), job_graph.checkpointing.clone(), request.checkpoint_services);

        let mut graph = ExecutionGraph::new(
            &request.job_information,
            request.parallelism_store,
            &request.attempt_numbers,
            checkpoint_coordinator,
            self.clock.clone(),
        )?;
        graph.restore_latest_checkpointed_state()?;

        log::debug!(
            "Created execution graph for job {} with {} subtasks.",
            graph.job_id(),
            graph.execution_vertices().count()
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, CheckpointType, CompletedCheckpoint};
    use crate::domain::clock::clock_mock::ManualClock;
    use crate::domain::job::job_graph::{JobGraph, JobVertex};
    use crate::domain::job::vertex_parallelism::{compute_vertex_parallelism_store, default_max_parallelism_of};
    use crate::domain::utils::id::ExecutionVertexId;
    use futures::FutureExt;
    use std::sync::Arc;

    #[test]
    fn test_factory_restores_latest_checkpoint_and_attempt_numbers() {
        let mut job_graph = JobGraph::new("job");
        let vertex = job_graph.add_vertex(JobVertex::new("map", 2));
        let store = compute_vertex_parallelism_store(job_graph.vertices(), default_max_parallelism_of);
        let services = CheckpointServices::standalone(1);
        services
            .completed_checkpoint_store
            .add_checkpoint_and_subsume_oldest(CompletedCheckpoint {
                job_id: job_graph.job_id.clone(),
                checkpoint_id: 4,
                timestamp: 0,
                completion_timestamp: 1,
                properties: CheckpointProperties::checkpoint(CheckpointType::Configured),
                external_pointer: "chk-4".to_string(),
                vertex_max_parallelism: Default::default(),
            })
            .unwrap();
        let mut attempt_numbers = VertexAttemptNumberStore::new();
        attempt_numbers.set_attempt_count(ExecutionVertexId::new(vertex.clone(), 1), 2);

        let factory = DefaultExecutionGraphFactory::new(Arc::new(ManualClock::new(0)));
        let request = ExecutionGraphCreationRequest {
            job_information: JobGraphJobInformation::new(job_graph, store.clone()),
            parallelism_store: store,
            attempt_numbers,
            checkpoint_services: services.clone(),
        };
        let graph = factory.create_and_restore_execution_graph(request).now_or_never().unwrap().unwrap();

        assert_eq!(graph.restored_checkpoint().unwrap().checkpoint_id, 4);
        assert_eq!(services.checkpoint_stats_tracker.create_snapshot().counts.number_of_restored, 1);
        let attempts: Vec<u32> = graph.current_attempt_numbers().into_iter().map(|(_, attempt)| attempt).collect();
        assert_eq!(attempts, vec![0, 2]);
    }
}
