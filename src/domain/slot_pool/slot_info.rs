use serde::Serialize;

use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::utils::id::{AllocationId, TaskManagerId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TaskManagerLocation {
    pub id: TaskManagerId,
    pub host: String,
}

impl TaskManagerLocation {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        TaskManagerLocation { id: TaskManagerId::new(id), host: host.into() }
    }
}

/// A slot a task manager offered to the job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotInfo {
    pub allocation_id: AllocationId,
    pub task_manager: TaskManagerLocation,
    pub physical_slot_number: u32,
    pub resource_profile: ResourceProfile,
}

/// Offer of a single slot by a task manager.
#[derive(Debug, Clone)]
pub struct SlotOffer {
    pub allocation_id: AllocationId,
    pub slot_index: u32,
    pub resource_profile: ResourceProfile,
}

impl SlotOffer {
    pub fn new(slot_index: u32, resource_profile: ResourceProfile) -> Self {
        SlotOffer { allocation_id: AllocationId::random(), slot_index, resource_profile }
    }
}
