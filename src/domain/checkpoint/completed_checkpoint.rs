use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::utils::id::{JobId, JobVertexId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckpointType {
    /// Whatever the job is configured to take.
    Configured,
    Full,
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SavepointFormatType {
    #[default]
    Canonical,
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SnapshotType {
    Checkpoint(CheckpointType),
    Savepoint { format: SavepointFormatType },
    /// Savepoint after which the tasks finish. `terminate` drains the pipeline first.
    SynchronousSavepoint { format: SavepointFormatType, terminate: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointProperties {
    pub snapshot_type: SnapshotType,
    pub target_location: Option<String>,
}

impl CheckpointProperties {
    pub fn checkpoint(checkpoint_type: CheckpointType) -> Self {
        CheckpointProperties { snapshot_type: SnapshotType::Checkpoint(checkpoint_type), target_location: None }
    }

    pub fn savepoint(format: SavepointFormatType, target_location: Option<String>) -> Self {
        CheckpointProperties { snapshot_type: SnapshotType::Savepoint { format }, target_location }
    }

    pub fn synchronous_savepoint(format: SavepointFormatType, terminate: bool, target_location: Option<String>) -> Self {
        CheckpointProperties { snapshot_type: SnapshotType::SynchronousSavepoint { format, terminate }, target_location }
    }

    pub fn is_savepoint(&self) -> bool {
        !matches!(self.snapshot_type, SnapshotType::Checkpoint(_))
    }
}

/// A checkpoint every task acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedCheckpoint {
    pub job_id: JobId,
    pub checkpoint_id: u64,
    pub timestamp: i64,
    pub completion_timestamp: i64,
    pub properties: CheckpointProperties,
    pub external_pointer: String,
    /// Max parallelism of every vertex when the checkpoint was taken.
    pub vertex_max_parallelism: BTreeMap<JobVertexId, u32>,
}
