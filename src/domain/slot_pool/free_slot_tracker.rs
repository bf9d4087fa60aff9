use std::collections::HashMap;

use crate::domain::slot_pool::slot_info::SlotInfo;
use crate::domain::utils::id::TaskManagerId;

/// Reserved and total slot counts of one task manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskManagerSlotCounts {
    pub reserved: usize,
    pub total: usize,
}

/// Snapshot of the free slots of a pool, including how busy each task manager is.
#[derive(Debug, Clone, Default)]
pub struct FreeSlotTracker {
    free_slots: Vec<SlotInfo>,
    task_manager_slots: HashMap<TaskManagerId, TaskManagerSlotCounts>,
}

impl FreeSlotTracker {
    pub fn new(free_slots: Vec<SlotInfo>, task_manager_slots: HashMap<TaskManagerId, TaskManagerSlotCounts>) -> Self {
        FreeSlotTracker { free_slots, task_manager_slots }
    }

    /// Tracker over `free_slots` only, as if no slot were reserved.
    pub fn from_free_slots(free_slots: Vec<SlotInfo>) -> Self {
        let mut task_manager_slots: HashMap<TaskManagerId, TaskManagerSlotCounts> = HashMap::new();
        for slot in &free_slots {
            task_manager_slots.entry(slot.task_manager.id.clone()).or_default().total += 1;
        }
        FreeSlotTracker { free_slots, task_manager_slots }
    }

    pub fn get_free_slots_information(&self) -> &[SlotInfo] {
        &self.free_slots
    }

    /// Share of reserved slots on the task manager, between 0.0 and 1.0.
    pub fn get_task_executor_utilization(&self, task_manager: &TaskManagerId) -> f64 {
        self.utilization_with_additional_reservations(task_manager, 0)
    }

    /// Utilization once `additional` more slots of the task manager are reserved.
    pub fn utilization_with_additional_reservations(&self, task_manager: &TaskManagerId, additional: usize) -> f64 {
        match self.task_manager_slots.get(task_manager) {
            Some(counts) if counts.total > 0 => (counts.reserved + additional) as f64 / counts.total as f64,
            _ => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.free_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free_slots.is_empty()
    }
}
