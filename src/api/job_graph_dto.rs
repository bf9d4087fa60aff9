use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::job::job_graph::{CheckpointingSettings, JobGraph, JobType, JobVertex, ResultPartitionType};
use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::utils::id::{JobId, JobVertexId, SlotSharingGroupId};
use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobTypeDto {
    Streaming,
    Batch,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultPartitionTypeDto {
    Pipelined,
    PipelinedBounded,
    Blocking,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobGraphDto {
    pub job_id: Option<String>,
    pub name: String,
    #[serde(default = "default_job_type")]
    pub job_type: JobTypeDto,

    pub vertices: Vec<JobVertexDto>,
    #[serde(default)]
    pub edges: Vec<JobEdgeDto>,
    #[serde(default)]
    pub slot_sharing_groups: Vec<SlotSharingGroupDto>,

    pub checkpointing: Option<CheckpointingDto>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobVertexDto {
    pub id: String,
    pub name: String,
    pub parallelism: u32,
    pub max_parallelism: Option<u32>,
    pub slot_sharing_group: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JobEdgeDto {
    pub source: String,
    pub target: String,
    #[serde(default = "default_result_type")]
    pub result_type: ResultPartitionTypeDto,
}

/// Profile of the shared slots of a group. Groups without an entry take any slot.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SlotSharingGroupDto {
    pub id: String,
    pub cpu_millis: u64,
    pub task_heap_mb: u64,
    #[serde(default)]
    pub managed_memory_mb: u64,
    #[serde(default)]
    pub network_memory_mb: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointingDto {
    pub interval_ms: u64,
    pub default_savepoint_directory: Option<String>,
    #[serde(default = "default_max_retained_checkpoints")]
    pub max_retained_checkpoints: usize,
}

fn default_job_type() -> JobTypeDto {
    JobTypeDto::Streaming
}

fn default_result_type() -> ResultPartitionTypeDto {
    ResultPartitionTypeDto::Pipelined
}

fn default_max_retained_checkpoints() -> usize {
    1
}

impl From<JobTypeDto> for JobType {
    fn from(dto: JobTypeDto) -> Self {
        match dto {
            JobTypeDto::Streaming => JobType::Streaming,
            JobTypeDto::Batch => JobType::Batch,
        }
    }
}

impl From<ResultPartitionTypeDto> for ResultPartitionType {
    fn from(dto: ResultPartitionTypeDto) -> Self {
        match dto {
            ResultPartitionTypeDto::Pipelined => ResultPartitionType::Pipelined,
            ResultPartitionTypeDto::PipelinedBounded => ResultPartitionType::PipelinedBounded,
            ResultPartitionTypeDto::Blocking => ResultPartitionType::Blocking,
        }
    }
}

impl TryFrom<JobGraphDto> for JobGraph {
    type Error = Error;

    fn try_from(dto: JobGraphDto) -> Result<Self> {
        let mut job_graph = JobGraph::new(dto.name).with_job_type(dto.job_type.into());
        if let Some(job_id) = dto.job_id {
            job_graph = job_graph.with_job_id(JobId::new(job_id));
        }

        let mut vertex_ids: HashMap<String, JobVertexId> = HashMap::new();
        for vertex_dto in dto.vertices {
            if vertex_ids.contains_key(&vertex_dto.id) {
                return Err(Error::InvalidJobGraph(format!("Vertex id '{}' is used more than once.", vertex_dto.id)));
            }

            let id = JobVertexId::new(vertex_dto.id.clone());
            let mut vertex = JobVertex::new(vertex_dto.name, vertex_dto.parallelism).with_id(id.clone());
            if let Some(max_parallelism) = vertex_dto.max_parallelism {
                vertex = vertex.with_max_parallelism(max_parallelism);
            }
            if let Some(group) = vertex_dto.slot_sharing_group {
                vertex = vertex.with_slot_sharing_group(SlotSharingGroupId::new(group));
            }
            job_graph.add_vertex(vertex);
            vertex_ids.insert(vertex_dto.id, id);
        }

        for edge in dto.edges {
            let lookup = |name: &str| {
                vertex_ids
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::InvalidJobGraph(format!("Edge refers to unknown vertex '{}'.", name)))
            };
            let source = lookup(&edge.source)?;
            let target = lookup(&edge.target)?;
            job_graph.connect(&source, &target, edge.result_type.into())?;
        }

        for group in dto.slot_sharing_groups {
            job_graph.set_slot_sharing_group_profile(
                SlotSharingGroupId::new(group.id),
                ResourceProfile::specified(group.cpu_millis, group.task_heap_mb, group.managed_memory_mb, group.network_memory_mb),
            );
        }

        if let Some(checkpointing) = dto.checkpointing {
            if checkpointing.interval_ms == 0 {
                return Err(Error::InvalidJobGraph("The checkpoint interval must be positive.".to_string()));
            }
            job_graph = job_graph.with_checkpointing(CheckpointingSettings {
                checkpoint_interval: Duration::from_millis(checkpointing.interval_ms),
                default_savepoint_directory: checkpointing.default_savepoint_directory,
                max_retained_checkpoints: checkpointing.max_retained_checkpoints,
            });
        }

        Ok(job_graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parser::parse_json_str;

    const PIPELINE: &str = r#"{
        "jobId": "word-count",
        "name": "WordCount",
        "vertices": [
            { "id": "source", "name": "Source", "parallelism": 2 },
            { "id": "sink", "name": "Sink", "parallelism": 2, "maxParallelism": 8, "slotSharingGroup": "sinks" }
        ],
        "edges": [ { "source": "source", "target": "sink" } ],
        "slotSharingGroups": [ { "id": "sinks", "cpuMillis": 1000, "taskHeapMb": 512 } ],
        "checkpointing": { "intervalMs": 5000, "defaultSavepointDirectory": "/tmp/savepoints" }
    }"#;

    #[test]
    fn test_job_graph_from_json() {
        let dto: JobGraphDto = parse_json_str(PIPELINE).unwrap();
        let job_graph = JobGraph::try_from(dto).unwrap();

        assert_eq!(job_graph.job_id, JobId::new("word-count"));
        assert_eq!(job_graph.job_type, JobType::Streaming);
        assert_eq!(job_graph.number_of_vertices(), 2);

        let sink = job_graph.vertex(&JobVertexId::new("sink")).unwrap();
        assert_eq!(sink.max_parallelism, Some(8));
        assert_eq!(sink.inputs.len(), 1);
        assert_eq!(sink.inputs[0].result_type, ResultPartitionType::Pipelined);
        assert_eq!(
            job_graph.slot_sharing_group_profile(&SlotSharingGroupId::new("sinks")),
            ResourceProfile::specified(1000, 512, 0, 0)
        );
        assert_eq!(job_graph.checkpointing.as_ref().map(|c| c.checkpoint_interval), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_unknown_edge_target_is_rejected() {
        let json = r#"{
            "name": "Broken",
            "vertices": [ { "id": "source", "name": "Source", "parallelism": 1 } ],
            "edges": [ { "source": "source", "target": "missing" } ]
        }"#;
        let dto: JobGraphDto = parse_json_str(json).unwrap();
        assert!(matches!(JobGraph::try_from(dto), Err(Error::InvalidJobGraph(_))));
    }

    #[test]
    fn test_duplicate_vertex_ids_are_rejected() {
        let json = r#"{
            "name": "Twice",
            "vertices": [
                { "id": "a", "name": "A", "parallelism": 1 },
                { "id": "a", "name": "B", "parallelism": 1 }
            ]
        }"#;
        let dto: JobGraphDto = parse_json_str(json).unwrap();
        assert!(matches!(JobGraph::try_from(dto), Err(Error::InvalidJobGraph(_))));
    }
}
