use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize)]
pub struct Id<T> {
    pub id: String,
    _marker: PhantomData<T>,
}

impl<T> Id<T> {
    pub fn new(id: impl Into<String>) -> Self {
        Id { id: id.into(), _marker: PhantomData }
    }

    /// Creates an id backed by a random v4 uuid in its simple (dash free) form.
    pub fn random() -> Self {
        Id::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<Id<T>> for String {
    fn from(id_wrapper: Id<T>) -> Self {
        id_wrapper.id
    }
}

impl<T> From<&str> for Id<T> {
    fn from(id: &str) -> Self {
        Id::new(id)
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_name = std::any::type_name::<T>();
        let clean_name = full_name.split("::").last().unwrap_or(full_name);
        let display_name = clean_name.replace("Tag", "Id");

        write!(f, "{}: {:?}", display_name, self.id)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct JobTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct JobVertexTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct IntermediateDataSetTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct SlotSharingGroupTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct OperatorTag;

// Resource Domain Tags
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct AllocationTag;
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Copy)]
pub struct TaskManagerTag;

pub type JobId = Id<JobTag>;
pub type JobVertexId = Id<JobVertexTag>;
pub type IntermediateDataSetId = Id<IntermediateDataSetTag>;
pub type SlotSharingGroupId = Id<SlotSharingGroupTag>;
pub type OperatorId = Id<OperatorTag>;

pub type AllocationId = Id<AllocationTag>;
pub type TaskManagerId = Id<TaskManagerTag>;

/// Identifies one parallel subtask of a job vertex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExecutionVertexId {
    pub job_vertex_id: JobVertexId,
    pub subtask_index: u32,
}

impl ExecutionVertexId {
    pub fn new(job_vertex_id: JobVertexId, subtask_index: u32) -> Self {
        ExecutionVertexId { job_vertex_id, subtask_index }
    }
}

impl fmt::Display for ExecutionVertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.job_vertex_id, self.subtask_index)
    }
}

/// Identifies one execution attempt of a subtask.
///
/// Attempt numbers keep increasing across restarts, so an attempt id stays unique for the whole job.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExecutionAttemptId {
    pub execution_vertex_id: ExecutionVertexId,
    pub attempt_number: u32,
}

impl ExecutionAttemptId {
    pub fn new(execution_vertex_id: ExecutionVertexId, attempt_number: u32) -> Self {
        ExecutionAttemptId { execution_vertex_id, attempt_number }
    }
}

impl fmt::Display for ExecutionAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.execution_vertex_id, self.attempt_number)
    }
}
