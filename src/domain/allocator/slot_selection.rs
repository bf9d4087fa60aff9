use std::collections::HashMap;

use crate::domain::allocator::job_allocations_information::JobAllocationsInformation;
use crate::domain::allocator::slot_allocator::ExecutionSlotSharingGroup;
use crate::domain::slot_pool::free_slot_tracker::FreeSlotTracker;
use crate::domain::slot_pool::slot_info::SlotInfo;
use crate::domain::utils::id::TaskManagerId;

const LOCAL_WEIGHT: f64 = 20.0;
const HOST_LOCAL_WEIGHT: f64 = 2.0;

/// State the selection strategy may look at while a plan is built.
pub struct SlotSelectionContext<'a> {
    pub free_slots: &'a FreeSlotTracker,
    pub previous_allocations: &'a JobAllocationsInformation,
    /// Slots already handed out by the plan under construction, per task manager.
    pub planned_reservations: &'a HashMap<TaskManagerId, usize>,
}

/// Picks the slot an execution slot sharing group should run in.
pub trait SlotSelectionStrategy: Send + Sync {
    /// Returns the index of the chosen candidate.
    fn select_best_slot(&self, candidates: &[SlotInfo], group: &ExecutionSlotSharingGroup, context: &SlotSelectionContext<'_>) -> Option<usize>;
}

/// Prefers slots the group's subtasks used before, then hosts they ran on, then the least busy
/// task manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct EvenlySpreadOutSlotSelectionStrategy;

impl EvenlySpreadOutSlotSelectionStrategy {
    fn score(&self, candidate: &SlotInfo, group: &ExecutionSlotSharingGroup, context: &SlotSelectionContext<'_>) -> f64 {
        let mut local = 0.0;
        let mut host_local = 0.0;
        for execution_vertex in &group.execution_vertices {
            if let Some(previous) = context.previous_allocations.get_previous_allocation(execution_vertex) {
                if previous.allocation_id == candidate.allocation_id {
                    local += 1.0;
                } else if previous.task_manager.host == candidate.task_manager.host {
                    host_local += 1.0;
                }
            }
        }

        let task_manager = &candidate.task_manager.id;
        let planned = context.planned_reservations.get(task_manager).copied().unwrap_or(0);
        let utilization = context.free_slots.utilization_with_additional_reservations(task_manager, planned);

        local * LOCAL_WEIGHT + host_local * HOST_LOCAL_WEIGHT - utilization
    }
}

impl SlotSelectionStrategy for EvenlySpreadOutSlotSelectionStrategy {
    fn select_best_slot(&self, candidates: &[SlotInfo], group: &ExecutionSlotSharingGroup, context: &SlotSelectionContext<'_>) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            let score = self.score(candidate, group, context);
            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
        }
        best.map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocator::job_allocations_information::PreviousAllocation;
    use crate::domain::resource::resource_profile::ResourceProfile;
    use crate::domain::slot_pool::slot_info::TaskManagerLocation;
    use crate::domain::utils::id::{AllocationId, ExecutionVertexId, JobVertexId, SlotSharingGroupId};

    fn slot(allocation: &str, task_manager: &str) -> SlotInfo {
        SlotInfo {
            allocation_id: AllocationId::new(allocation),
            task_manager: TaskManagerLocation::new(task_manager, format!("host-{}", task_manager)),
            physical_slot_number: 0,
            resource_profile: ResourceProfile::UNKNOWN,
        }
    }

    fn group(vertex: &ExecutionVertexId) -> ExecutionSlotSharingGroup {
        ExecutionSlotSharingGroup {
            slot_sharing_group: SlotSharingGroupId::new("default"),
            resource_profile: ResourceProfile::UNKNOWN,
            execution_vertices: vec![vertex.clone()],
        }
    }

    #[test]
    fn test_previous_allocation_wins() {
        let vertex = ExecutionVertexId::new(JobVertexId::new("map"), 0);
        let candidates = vec![slot("a1", "tm-1"), slot("a2", "tm-2")];
        let previous = JobAllocationsInformation::new(HashMap::from([(
            vertex.clone(),
            PreviousAllocation { allocation_id: AllocationId::new("a2"), task_manager: TaskManagerLocation::new("tm-2", "host-tm-2") },
        )]));
        let tracker = FreeSlotTracker::from_free_slots(candidates.clone());
        let planned = HashMap::new();
        let context = SlotSelectionContext { free_slots: &tracker, previous_allocations: &previous, planned_reservations: &planned };

        let chosen = EvenlySpreadOutSlotSelectionStrategy.select_best_slot(&candidates, &group(&vertex), &context);
        assert_eq!(chosen, Some(1));
    }

    #[test]
    fn test_least_utilized_task_manager_wins() {
        let vertex = ExecutionVertexId::new(JobVertexId::new("map"), 0);
        let candidates = vec![slot("a1", "tm-1"), slot("a2", "tm-1"), slot("a3", "tm-2")];
        let tracker = FreeSlotTracker::from_free_slots(candidates.clone());
        let previous = JobAllocationsInformation::empty();
        let planned = HashMap::from([(TaskManagerId::new("tm-1"), 1)]);
        let context = SlotSelectionContext { free_slots: &tracker, previous_allocations: &previous, planned_reservations: &planned };

        let chosen = EvenlySpreadOutSlotSelectionStrategy.select_best_slot(&candidates, &group(&vertex), &context);
        assert_eq!(chosen, Some(2));
    }
}
