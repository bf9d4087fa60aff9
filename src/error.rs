use thiserror::Error;

use crate::domain::checkpoint::checkpoint_exception::CheckpointException;
use crate::domain::utils::id::OperatorId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Invalid job graph: {0}")]
    InvalidJobGraph(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid resource requirements: {0}")]
    InvalidResourceRequirements(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Not enough resources available for scheduling: {0}")]
    NoResourceAvailable(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointException),

    #[error("Task is not running: {0}")]
    TaskNotRunning(String),

    #[error("Coordinator of operator {0} does not exist or the job vertex this operator belongs to is not initialized.")]
    CoordinatorNotExist(OperatorId),

    #[error("Failed to create the execution graph: {0}")]
    ExecutionGraphCreation(String),

    #[error("{0}")]
    OperationFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
