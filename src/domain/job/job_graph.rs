use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::domain::execution::operator_coordinator::OperatorCoordinatorProvider;
use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::utils::id::{IntermediateDataSetId, JobId, JobVertexId, SlotSharingGroupId};
use crate::error::{Error, Result};

pub const DEFAULT_SLOT_SHARING_GROUP: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobType {
    Streaming,
    Batch,
}

/// How the data of an intermediate result is exchanged between producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultPartitionType {
    /// Consumed while being produced, unbounded buffering.
    Pipelined,
    /// Consumed while being produced, bounded buffering.
    PipelinedBounded,
    /// Fully produced before it can be consumed.
    Blocking,
}

impl ResultPartitionType {
    pub fn is_pipelined(&self) -> bool {
        matches!(self, ResultPartitionType::Pipelined | ResultPartitionType::PipelinedBounded)
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, ResultPartitionType::Blocking)
    }
}

#[derive(Debug, Clone)]
pub struct IntermediateDataSet {
    pub id: IntermediateDataSetId,
    pub producer: JobVertexId,
    pub result_type: ResultPartitionType,
}

#[derive(Debug, Clone)]
pub struct JobEdge {
    pub source: IntermediateDataSetId,
    pub target: JobVertexId,
    pub result_type: ResultPartitionType,
}

#[derive(Debug, Clone)]
pub struct JobVertex {
    pub id: JobVertexId,
    pub name: String,
    pub parallelism: u32,
    /// `None` lets the scheduler derive a default from the parallelism.
    pub max_parallelism: Option<u32>,
    pub slot_sharing_group: SlotSharingGroupId,
    pub produced_data_sets: Vec<IntermediateDataSet>,
    pub inputs: Vec<JobEdge>,
    pub operator_coordinators: Vec<OperatorCoordinatorProvider>,
}

impl JobVertex {
    pub fn new(name: impl Into<String>, parallelism: u32) -> Self {
        JobVertex {
            id: JobVertexId::random(),
            name: name.into(),
            parallelism,
            max_parallelism: None,
            slot_sharing_group: SlotSharingGroupId::new(DEFAULT_SLOT_SHARING_GROUP),
            produced_data_sets: Vec::new(),
            inputs: Vec::new(),
            operator_coordinators: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: JobVertexId) -> Self {
        self.id = id;
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: u32) -> Self {
        self.max_parallelism = Some(max_parallelism);
        self
    }

    pub fn with_slot_sharing_group(mut self, group: SlotSharingGroupId) -> Self {
        self.slot_sharing_group = group;
        self
    }

    pub fn with_operator_coordinator(mut self, provider: OperatorCoordinatorProvider) -> Self {
        self.operator_coordinators.push(provider);
        self
    }

    /// Adds a result this vertex produces that no vertex of the job consumes.
    pub fn with_unconsumed_output(mut self, result_type: ResultPartitionType) -> Self {
        self.produced_data_sets.push(IntermediateDataSet {
            id: IntermediateDataSetId::random(),
            producer: self.id.clone(),
            result_type,
        });
        self
    }
}

/// Periodic checkpointing configuration of a job. Absent means checkpointing is disabled.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointingSettings {
    pub checkpoint_interval: Duration,
    pub default_savepoint_directory: Option<String>,
    pub max_retained_checkpoints: usize,
}

impl Default for CheckpointingSettings {
    fn default() -> Self {
        CheckpointingSettings {
            checkpoint_interval: Duration::from_secs(10),
            default_savepoint_directory: None,
            max_retained_checkpoints: 1,
        }
    }
}

/// Static description of a job: vertices in insertion order plus the data sets connecting them.
#[derive(Debug, Clone)]
pub struct JobGraph {
    pub job_id: JobId,
    pub name: String,
    pub job_type: JobType,
    vertices: Vec<JobVertex>,
    slot_sharing_group_profiles: HashMap<SlotSharingGroupId, ResourceProfile>,
    pub checkpointing: Option<CheckpointingSettings>,
}

impl JobGraph {
    pub fn new(name: impl Into<String>) -> Self {
        JobGraph {
            job_id: JobId::random(),
            name: name.into(),
            job_type: JobType::Streaming,
            vertices: Vec::new(),
            slot_sharing_group_profiles: HashMap::new(),
            checkpointing: None,
        }
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn with_checkpointing(mut self, settings: CheckpointingSettings) -> Self {
        self.checkpointing = Some(settings);
        self
    }

    pub fn add_vertex(&mut self, vertex: JobVertex) -> JobVertexId {
        let id = vertex.id.clone();
        self.vertices.push(vertex);
        id
    }

    /// Connects `upstream` to `downstream` through a new intermediate data set.
    pub fn connect(&mut self, upstream: &JobVertexId, downstream: &JobVertexId, result_type: ResultPartitionType) -> Result<()> {
        if self.vertex(downstream).is_none() {
            return Err(Error::InvalidJobGraph(format!("Unknown downstream vertex {}", downstream)));
        }
        let producer = self
            .vertex_mut(upstream)
            .ok_or_else(|| Error::InvalidJobGraph(format!("Unknown upstream vertex {}", upstream)))?;

        let data_set = IntermediateDataSet { id: IntermediateDataSetId::random(), producer: upstream.clone(), result_type };
        let edge = JobEdge { source: data_set.id.clone(), target: downstream.clone(), result_type };
        producer.produced_data_sets.push(data_set);

        if let Some(consumer) = self.vertex_mut(downstream) {
            consumer.inputs.push(edge);
        }
        Ok(())
    }

    pub fn set_slot_sharing_group_profile(&mut self, group: SlotSharingGroupId, profile: ResourceProfile) {
        self.slot_sharing_group_profiles.insert(group, profile);
    }

    pub fn slot_sharing_group_profile(&self, group: &SlotSharingGroupId) -> ResourceProfile {
        self.slot_sharing_group_profiles.get(group).copied().unwrap_or(ResourceProfile::UNKNOWN)
    }

    pub fn vertices(&self) -> &[JobVertex] {
        &self.vertices
    }

    pub fn vertex(&self, id: &JobVertexId) -> Option<&JobVertex> {
        self.vertices.iter().find(|vertex| &vertex.id == id)
    }

    pub fn vertex_mut(&mut self, id: &JobVertexId) -> Option<&mut JobVertex> {
        self.vertices.iter_mut().find(|vertex| &vertex.id == id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &JobEdge> {
        self.vertices.iter().flat_map(|vertex| vertex.inputs.iter())
    }

    pub fn number_of_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_checkpointing_enabled(&self) -> bool {
        self.checkpointing.is_some()
    }
}
