use std::collections::{BTreeMap, HashMap};

use crate::domain::allocator::job_allocations_information::JobAllocationsInformation;
use crate::domain::job::job_information::JobGraphJobInformation;
use crate::domain::resource::resource_counter::ResourceCounter;
use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::slot_pool::declarative_slot_pool::DeclarativeSlotPool;
use crate::domain::slot_pool::free_slot_tracker::FreeSlotTracker;
use crate::domain::slot_pool::slot_info::{SlotInfo, TaskManagerLocation};
use crate::domain::utils::id::{AllocationId, ExecutionVertexId, JobVertexId, SlotSharingGroupId};

/// Parallelism chosen for every vertex of a job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexParallelism {
    parallelism: BTreeMap<JobVertexId, u32>,
}

impl VertexParallelism {
    pub fn new(parallelism: BTreeMap<JobVertexId, u32>) -> Self {
        VertexParallelism { parallelism }
    }

    pub fn get_parallelism(&self, vertex: &JobVertexId) -> Option<u32> {
        self.parallelism.get(vertex).copied()
    }

    pub fn vertices(&self) -> impl Iterator<Item = &JobVertexId> {
        self.parallelism.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&JobVertexId, u32)> {
        self.parallelism.iter().map(|(vertex, parallelism)| (vertex, *parallelism))
    }
}

/// Subtasks that share one slot: at most one subtask per vertex of a slot sharing group.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSlotSharingGroup {
    pub slot_sharing_group: SlotSharingGroupId,
    pub resource_profile: ResourceProfile,
    pub execution_vertices: Vec<ExecutionVertexId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotAssignment {
    pub slot: SlotInfo,
    pub target: ExecutionSlotSharingGroup,
}

/// Parallelism decision plus the slot each execution slot sharing group goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSchedulingPlan {
    vertex_parallelism: VertexParallelism,
    slot_assignments: Vec<SlotAssignment>,
}

impl JobSchedulingPlan {
    pub fn new(vertex_parallelism: VertexParallelism, slot_assignments: Vec<SlotAssignment>) -> Self {
        JobSchedulingPlan { vertex_parallelism, slot_assignments }
    }

    pub fn empty() -> Self {
        JobSchedulingPlan::new(VertexParallelism::default(), Vec::new())
    }

    pub fn vertex_parallelism(&self) -> &VertexParallelism {
        &self.vertex_parallelism
    }

    pub fn slot_assignments(&self) -> &[SlotAssignment] {
        &self.slot_assignments
    }
}

/// The slot an execution vertex was deployed into.
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalSlot {
    pub allocation_id: AllocationId,
    pub task_manager: TaskManagerLocation,
}

#[derive(Debug, Clone, Default)]
pub struct ReservedSlots {
    slots: HashMap<ExecutionVertexId, LogicalSlot>,
}

impl ReservedSlots {
    pub fn new(slots: HashMap<ExecutionVertexId, LogicalSlot>) -> Self {
        ReservedSlots { slots }
    }

    pub fn get_slot_for(&self, execution_vertex: &ExecutionVertexId) -> Option<&LogicalSlot> {
        self.slots.get(execution_vertex)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Decides parallelism and slot placement from the free slots of the pool.
pub trait SlotAllocator: Send {
    /// Resources needed to run every vertex at its upper parallelism bound.
    fn calculate_required_slots(&self, job_information: &JobGraphJobInformation) -> ResourceCounter;

    /// Best parallelism reachable with `free_slots`, or `None` if a lower bound cannot be met.
    fn determine_parallelism(&self, job_information: &JobGraphJobInformation, free_slots: &[SlotInfo]) -> Option<VertexParallelism>;

    fn determine_parallelism_and_calculate_assignment(
        &self,
        job_information: &JobGraphJobInformation,
        free_slots: &FreeSlotTracker,
        previous_allocations: &JobAllocationsInformation,
    ) -> Option<JobSchedulingPlan>;

    /// Reserves every slot of the plan, or none of them.
    fn try_reserve_resources(
        &self,
        plan: &JobSchedulingPlan,
        slot_pool: &mut dyn DeclarativeSlotPool,
        current_time_millis: i64,
    ) -> Option<ReservedSlots>;
}
