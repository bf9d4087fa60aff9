use std::collections::HashMap;

use crate::domain::slot_pool::slot_info::TaskManagerLocation;
use crate::domain::utils::id::{AllocationId, ExecutionVertexId};

#[derive(Debug, Clone, PartialEq)]
pub struct PreviousAllocation {
    pub allocation_id: AllocationId,
    pub task_manager: TaskManagerLocation,
}

/// Where the subtasks of the previous attempt ran.
///
/// Only a hint for slot selection: reusing a slot keeps local state around.
#[derive(Debug, Clone, Default)]
pub struct JobAllocationsInformation {
    allocations: HashMap<ExecutionVertexId, PreviousAllocation>,
}

impl JobAllocationsInformation {
    pub fn new(allocations: HashMap<ExecutionVertexId, PreviousAllocation>) -> Self {
        JobAllocationsInformation { allocations }
    }

    pub fn empty() -> Self {
        JobAllocationsInformation::default()
    }

    pub fn get_previous_allocation(&self, execution_vertex: &ExecutionVertexId) -> Option<&PreviousAllocation> {
        self.allocations.get(execution_vertex)
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}
