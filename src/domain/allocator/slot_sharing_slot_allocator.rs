use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::allocator::job_allocations_information::JobAllocationsInformation;
use crate::domain::allocator::slot_allocator::{
    ExecutionSlotSharingGroup, JobSchedulingPlan, LogicalSlot, ReservedSlots, SlotAllocator, SlotAssignment, VertexParallelism,
};
use crate::domain::allocator::slot_selection::{EvenlySpreadOutSlotSelectionStrategy, SlotSelectionContext, SlotSelectionStrategy};
use crate::domain::job::job_information::{JobGraphJobInformation, SlotSharingGroup, VertexInformation};
use crate::domain::resource::resource_counter::ResourceCounter;
use crate::domain::slot_pool::declarative_slot_pool::DeclarativeSlotPool;
use crate::domain::slot_pool::free_slot_tracker::FreeSlotTracker;
use crate::domain::slot_pool::slot_info::SlotInfo;
use crate::domain::utils::id::{AllocationId, ExecutionVertexId, JobVertexId, TaskManagerId};

/// Bounds of a slot sharing group derived from its member vertices.
struct SlotSharingGroupMetaInfo<'a> {
    group: &'a SlotSharingGroup,
    /// Largest lower bound among the members.
    max_lower_bound: u32,
    /// Largest upper bound among the members.
    max_upper_bound: u32,
}

/// Allocator where every slot runs at most one subtask of each vertex of a slot sharing group.
pub struct SlotSharingSlotAllocator {
    selection_strategy: Arc<dyn SlotSelectionStrategy>,
}

impl SlotSharingSlotAllocator {
    pub fn new(selection_strategy: Arc<dyn SlotSelectionStrategy>) -> Self {
        SlotSharingSlotAllocator { selection_strategy }
    }

    fn meta_infos<'a>(groups: &'a [SlotSharingGroup], vertices: &HashMap<JobVertexId, VertexInformation>) -> Vec<SlotSharingGroupMetaInfo<'a>> {
        groups
            .iter()
            .map(|group| {
                let members = group.job_vertex_ids.iter().filter_map(|id| vertices.get(id));
                let (max_lower_bound, max_upper_bound) = members
                    .fold((0, 0), |(lower, upper), vertex| (lower.max(vertex.min_parallelism), upper.max(vertex.parallelism)));
                SlotSharingGroupMetaInfo { group, max_lower_bound, max_upper_bound }
            })
            .collect()
    }

    /// Takes one slot that can serve `group` out of `remaining`.
    ///
    /// Slots a subtask of the group ran in before come first, then slots with exactly the
    /// requested profile, then any matching slot.
    fn take_slot_for(
        group: &SlotSharingGroup,
        remaining: &mut Vec<SlotInfo>,
        preferred: &[AllocationId],
    ) -> Option<SlotInfo> {
        let required = group.resource_profile;
        let position = remaining
            .iter()
            .position(|slot| preferred.contains(&slot.allocation_id) && slot.resource_profile.is_matching(&required))
            .or_else(|| remaining.iter().position(|slot| slot.resource_profile == required))
            .or_else(|| remaining.iter().position(|slot| slot.resource_profile.is_matching(&required)))?;
        Some(remaining.remove(position))
    }

    /// Distributes the free slots over the slot sharing groups.
    ///
    /// Every group first gets the largest lower bound of its vertices, then the remaining slots
    /// are handed out round-robin until each group reaches its largest upper bound.
    fn distribute_slots(
        meta_infos: &[SlotSharingGroupMetaInfo<'_>],
        free_slots: &[SlotInfo],
        previous_allocations: &JobAllocationsInformation,
    ) -> Option<Vec<Vec<SlotInfo>>> {
        let minimum_required_slots: u32 = meta_infos.iter().map(|info| info.max_lower_bound).sum();
        if minimum_required_slots as usize > free_slots.len() {
            return None;
        }

        let preferred: Vec<Vec<AllocationId>> = meta_infos
            .iter()
            .map(|info| {
                info.group
                    .job_vertex_ids
                    .iter()
                    .flat_map(|vertex| (0..info.max_upper_bound).map(move |index| ExecutionVertexId::new(vertex.clone(), index)))
                    .filter_map(|execution_vertex| previous_allocations.get_previous_allocation(&execution_vertex))
                    .map(|previous| previous.allocation_id.clone())
                    .collect()
            })
            .collect();

        let mut remaining = free_slots.to_vec();
        let mut slots_per_group: Vec<Vec<SlotInfo>> = vec![Vec::new(); meta_infos.len()];

        // Groups with a concrete profile go first so that wildcard groups don't take their slots.
        let mut order: Vec<usize> = (0..meta_infos.len()).collect();
        order.sort_by_key(|index| meta_infos[*index].group.resource_profile.is_unknown());

        for &index in &order {
            for _ in 0..meta_infos[index].max_lower_bound {
                let slot = Self::take_slot_for(meta_infos[index].group, &mut remaining, &preferred[index])?;
                slots_per_group[index].push(slot);
            }
        }

        loop {
            let mut progressed = false;
            for &index in &order {
                if slots_per_group[index].len() >= meta_infos[index].max_upper_bound as usize {
                    continue;
                }
                if let Some(slot) = Self::take_slot_for(meta_infos[index].group, &mut remaining, &preferred[index]) {
                    slots_per_group[index].push(slot);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        Some(slots_per_group)
    }

    fn vertex_parallelism(
        meta_infos: &[SlotSharingGroupMetaInfo<'_>],
        slots_per_group: &[Vec<SlotInfo>],
        vertices: &HashMap<JobVertexId, VertexInformation>,
    ) -> VertexParallelism {
        let mut parallelism = BTreeMap::new();
        for (info, slots) in meta_infos.iter().zip(slots_per_group) {
            for vertex_id in &info.group.job_vertex_ids {
                if let Some(vertex) = vertices.get(vertex_id) {
                    parallelism.insert(vertex_id.clone(), vertex.parallelism.min(slots.len() as u32));
                }
            }
        }
        VertexParallelism::new(parallelism)
    }

    /// Subtask `i` of every member vertex shares the `i`-th slot of the group.
    fn create_execution_slot_sharing_groups(group: &SlotSharingGroup, slots: usize, parallelism: &VertexParallelism) -> Vec<ExecutionSlotSharingGroup> {
        (0..slots as u32)
            .map(|subtask_index| ExecutionSlotSharingGroup {
                slot_sharing_group: group.id.clone(),
                resource_profile: group.resource_profile,
                execution_vertices: group
                    .job_vertex_ids
                    .iter()
                    .filter(|vertex| parallelism.get_parallelism(vertex).is_some_and(|p| subtask_index < p))
                    .map(|vertex| ExecutionVertexId::new(vertex.clone(), subtask_index))
                    .collect(),
            })
            .filter(|group| !group.execution_vertices.is_empty())
            .collect()
    }

    fn vertex_map(job_information: &JobGraphJobInformation) -> HashMap<JobVertexId, VertexInformation> {
        job_information.vertices().into_iter().map(|vertex| (vertex.job_vertex_id.clone(), vertex)).collect()
    }
}

impl Default for SlotSharingSlotAllocator {
    fn default() -> Self {
        SlotSharingSlotAllocator::new(Arc::new(EvenlySpreadOutSlotSelectionStrategy))
    }
}

impl SlotAllocator for SlotSharingSlotAllocator {
    fn calculate_required_slots(&self, job_information: &JobGraphJobInformation) -> ResourceCounter {
        let groups = job_information.slot_sharing_groups();
        let vertices = Self::vertex_map(job_information);
        Self::meta_infos(&groups, &vertices)
            .iter()
            .fold(ResourceCounter::empty(), |counter, info| counter.add(info.group.resource_profile, info.max_upper_bound as usize))
    }

    fn determine_parallelism(&self, job_information: &JobGraphJobInformation, free_slots: &[SlotInfo]) -> Option<VertexParallelism> {
        let groups = job_information.slot_sharing_groups();
        let vertices = Self::vertex_map(job_information);
        let meta_infos = Self::meta_infos(&groups, &vertices);

        let slots_per_group = Self::distribute_slots(&meta_infos, free_slots, &JobAllocationsInformation::empty())?;
        Some(Self::vertex_parallelism(&meta_infos, &slots_per_group, &vertices))
    }

    fn determine_parallelism_and_calculate_assignment(
        &self,
        job_information: &JobGraphJobInformation,
        free_slots: &FreeSlotTracker,
        previous_allocations: &JobAllocationsInformation,
    ) -> Option<JobSchedulingPlan> {
        let groups = job_information.slot_sharing_groups();
        let vertices = Self::vertex_map(job_information);
        let meta_infos = Self::meta_infos(&groups, &vertices);

        let slots_per_group = Self::distribute_slots(&meta_infos, free_slots.get_free_slots_information(), previous_allocations)?;
        let parallelism = Self::vertex_parallelism(&meta_infos, &slots_per_group, &vertices);

        let mut planned_reservations: HashMap<TaskManagerId, usize> = HashMap::new();
        let mut assignments = Vec::new();

        for (info, slots) in meta_infos.iter().zip(slots_per_group) {
            let mut candidates = slots;
            for target in Self::create_execution_slot_sharing_groups(info.group, candidates.len(), &parallelism) {
                let context = SlotSelectionContext {
                    free_slots,
                    previous_allocations,
                    planned_reservations: &planned_reservations,
                };
                let chosen = self.selection_strategy.select_best_slot(&candidates, &target, &context)?;
                let slot = candidates.remove(chosen);
                *planned_reservations.entry(slot.task_manager.id.clone()).or_insert(0) += 1;
                assignments.push(SlotAssignment { slot, target });
            }
        }

        Some(JobSchedulingPlan::new(parallelism, assignments))
    }

    fn try_reserve_resources(
        &self,
        plan: &JobSchedulingPlan,
        slot_pool: &mut dyn DeclarativeSlotPool,
        current_time_millis: i64,
    ) -> Option<ReservedSlots> {
        let mut reserved: Vec<AllocationId> = Vec::new();
        let mut slots = HashMap::new();

        for assignment in plan.slot_assignments() {
            match slot_pool.reserve_free_slot(&assignment.slot.allocation_id, &assignment.target.resource_profile) {
                Ok(slot) => {
                    reserved.push(slot.allocation_id.clone());
                    for execution_vertex in &assignment.target.execution_vertices {
                        slots.insert(
                            execution_vertex.clone(),
                            LogicalSlot { allocation_id: slot.allocation_id.clone(), task_manager: slot.task_manager.clone() },
                        );
                    }
                }
                Err(e) => {
                    log::debug!("Could not reserve slot {}: {}", assignment.slot.allocation_id, e);
                    for allocation_id in &reserved {
                        slot_pool.free_reserved_slot(allocation_id, current_time_millis);
                    }
                    return None;
                }
            }
        }

        Some(ReservedSlots::new(slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::job_graph::{JobGraph, JobVertex};
    use crate::domain::job::vertex_parallelism::{compute_vertex_parallelism_store, default_max_parallelism_of};
    use crate::domain::resource::resource_profile::ResourceProfile;
    use crate::domain::slot_pool::default_declarative_slot_pool::DefaultDeclarativeSlotPool;
    use crate::domain::slot_pool::slot_info::{SlotOffer, TaskManagerLocation};
    use crate::domain::utils::id::SlotSharingGroupId;
    use std::time::Duration;

    fn job_information(graph: JobGraph) -> JobGraphJobInformation {
        let store = compute_vertex_parallelism_store(graph.vertices(), default_max_parallelism_of);
        JobGraphJobInformation::new(graph, store)
    }

    fn free_slots(count: u32) -> Vec<SlotInfo> {
        (0..count)
            .map(|index| SlotInfo {
                allocation_id: AllocationId::new(format!("slot-{}", index)),
                task_manager: TaskManagerLocation::new(format!("tm-{}", index % 2), "localhost"),
                physical_slot_number: index,
                resource_profile: ResourceProfile::UNKNOWN,
            })
            .collect()
    }

    #[test]
    fn test_shared_group_needs_max_parallelism_slots() {
        let mut graph = JobGraph::new("job");
        graph.add_vertex(JobVertex::new("source", 2));
        graph.add_vertex(JobVertex::new("sink", 4));
        let info = job_information(graph);

        let required = SlotSharingSlotAllocator::default().calculate_required_slots(&info);
        assert_eq!(required, ResourceCounter::with_resource(ResourceProfile::UNKNOWN, 4));
    }

    #[test]
    fn test_parallelism_is_capped_by_free_slots() {
        let mut graph = JobGraph::new("job");
        let source = graph.add_vertex(JobVertex::new("source", 2));
        let sink = graph.add_vertex(JobVertex::new("sink", 4));
        let info = job_information(graph);

        let parallelism = SlotSharingSlotAllocator::default().determine_parallelism(&info, &free_slots(3)).unwrap();
        assert_eq!(parallelism.get_parallelism(&source), Some(2));
        assert_eq!(parallelism.get_parallelism(&sink), Some(3));
    }

    #[test]
    fn test_no_slots_is_infeasible() {
        let mut graph = JobGraph::new("job");
        graph.add_vertex(JobVertex::new("source", 2));
        let info = job_information(graph);

        assert!(SlotSharingSlotAllocator::default().determine_parallelism(&info, &[]).is_none());
    }

    #[test]
    fn test_separate_groups_share_slots_round_robin() {
        let mut graph = JobGraph::new("job");
        let a = graph.add_vertex(JobVertex::new("a", 4).with_slot_sharing_group(SlotSharingGroupId::new("g1")));
        let b = graph.add_vertex(JobVertex::new("b", 4).with_slot_sharing_group(SlotSharingGroupId::new("g2")));
        let info = job_information(graph);

        let parallelism = SlotSharingSlotAllocator::default().determine_parallelism(&info, &free_slots(5)).unwrap();
        assert_eq!(parallelism.get_parallelism(&a), Some(3));
        assert_eq!(parallelism.get_parallelism(&b), Some(2));
    }

    #[test]
    fn test_assignment_covers_every_subtask() {
        let mut graph = JobGraph::new("job");
        let source = graph.add_vertex(JobVertex::new("source", 2));
        let sink = graph.add_vertex(JobVertex::new("sink", 3));
        let info = job_information(graph);
        let tracker = FreeSlotTracker::from_free_slots(free_slots(4));

        let plan = SlotSharingSlotAllocator::default()
            .determine_parallelism_and_calculate_assignment(&info, &tracker, &JobAllocationsInformation::empty())
            .unwrap();

        assert_eq!(plan.slot_assignments().len(), 3);
        let subtasks: usize = plan.slot_assignments().iter().map(|assignment| assignment.target.execution_vertices.len()).sum();
        assert_eq!(subtasks, 5);
        assert_eq!(plan.vertex_parallelism().get_parallelism(&source), Some(2));
        assert_eq!(plan.vertex_parallelism().get_parallelism(&sink), Some(3));
    }

    #[test]
    fn test_reservation_is_all_or_nothing() {
        let mut graph = JobGraph::new("job");
        graph.add_vertex(JobVertex::new("map", 2));
        let info = job_information(graph);

        let mut pool = DefaultDeclarativeSlotPool::new(Duration::from_secs(10));
        let offers = vec![SlotOffer::new(0, ResourceProfile::UNKNOWN), SlotOffer::new(1, ResourceProfile::UNKNOWN)];
        let accepted = pool.offer_slots(offers, TaskManagerLocation::new("tm-1", "localhost"), 0);

        let allocator = SlotSharingSlotAllocator::default();
        let plan = allocator
            .determine_parallelism_and_calculate_assignment(&info, &pool.get_free_slot_tracker(), &JobAllocationsInformation::empty())
            .unwrap();

        // Somebody else took one of the planned slots in the meantime.
        pool.reserve_free_slot(&accepted[1], &ResourceProfile::UNKNOWN).unwrap();

        assert!(allocator.try_reserve_resources(&plan, &mut pool, 0).is_none());
        assert_eq!(pool.get_free_slot_tracker().len(), 1);
    }
}
