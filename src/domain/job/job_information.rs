use std::collections::BTreeMap;

use crate::domain::job::job_graph::{JobGraph, JobType};
use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::utils::id::{JobId, JobVertexId, SlotSharingGroupId};

/// What the slot allocator needs to know about one vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexInformation {
    pub job_vertex_id: JobVertexId,
    pub vertex_name: String,
    pub min_parallelism: u32,
    pub parallelism: u32,
    pub max_parallelism: u32,
    pub slot_sharing_group: SlotSharingGroupId,
}

/// A slot sharing group together with the profile each of its shared slots needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSharingGroup {
    pub id: SlotSharingGroupId,
    pub resource_profile: ResourceProfile,
    pub job_vertex_ids: Vec<JobVertexId>,
}

/// The job graph seen through the current vertex parallelism store.
#[derive(Debug, Clone)]
pub struct JobGraphJobInformation {
    job_graph: JobGraph,
    parallelism_store: VertexParallelismStore,
}

impl JobGraphJobInformation {
    pub fn new(job_graph: JobGraph, parallelism_store: VertexParallelismStore) -> Self {
        JobGraphJobInformation { job_graph, parallelism_store }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_graph.job_id
    }

    pub fn name(&self) -> &str {
        &self.job_graph.name
    }

    pub fn job_type(&self) -> JobType {
        self.job_graph.job_type
    }

    pub fn parallelism_store(&self) -> &VertexParallelismStore {
        &self.parallelism_store
    }

    pub fn vertex_information(&self, vertex: &JobVertexId) -> Option<VertexInformation> {
        let job_vertex = self.job_graph.vertex(vertex)?;
        let info = self.parallelism_store.get_parallelism_info(vertex)?;
        Some(VertexInformation {
            job_vertex_id: vertex.clone(),
            vertex_name: job_vertex.name.clone(),
            min_parallelism: info.min_parallelism(),
            parallelism: info.parallelism(),
            max_parallelism: info.max_parallelism(),
            slot_sharing_group: job_vertex.slot_sharing_group.clone(),
        })
    }

    /// Vertices in job graph order.
    pub fn vertices(&self) -> Vec<VertexInformation> {
        self.job_graph.vertices().iter().filter_map(|vertex| self.vertex_information(&vertex.id)).collect()
    }

    /// Slot sharing groups ordered by id.
    pub fn slot_sharing_groups(&self) -> Vec<SlotSharingGroup> {
        let mut groups: BTreeMap<SlotSharingGroupId, Vec<JobVertexId>> = BTreeMap::new();
        for vertex in self.job_graph.vertices() {
            groups.entry(vertex.slot_sharing_group.clone()).or_default().push(vertex.id.clone());
        }
        groups
            .into_iter()
            .map(|(id, job_vertex_ids)| SlotSharingGroup {
                resource_profile: self.job_graph.slot_sharing_group_profile(&id),
                id,
                job_vertex_ids,
            })
            .collect()
    }

    pub fn copy_job_graph(&self) -> JobGraph {
        self.job_graph.clone()
    }

    pub fn job_graph(&self) -> &JobGraph {
        &self.job_graph
    }
}
