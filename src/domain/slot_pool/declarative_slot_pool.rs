use crate::domain::resource::resource_counter::ResourceCounter;
use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::slot_pool::free_slot_tracker::FreeSlotTracker;
use crate::domain::slot_pool::slot_info::{SlotInfo, SlotOffer, TaskManagerLocation};
use crate::domain::utils::id::AllocationId;
use crate::error::Result;

/// Called with the newly accepted slots whenever a task manager offers slots.
pub type NewSlotsListener = Box<dyn Fn(&[SlotInfo]) + Send>;

/// Pool of slots the job owns, driven by declared resource requirements.
///
/// Only the scheduler (on its main thread) talks to the pool.
pub trait DeclarativeSlotPool: Send {
    fn register_new_slots_listener(&mut self, listener: NewSlotsListener);

    fn set_resource_requirements(&mut self, requirements: ResourceCounter);

    fn get_resource_requirements(&self) -> ResourceCounter;

    /// Accepts offered slots and returns the allocation ids that were accepted.
    fn offer_slots(&mut self, offers: Vec<SlotOffer>, task_manager: TaskManagerLocation, current_time_millis: i64) -> Vec<AllocationId>;

    fn get_all_slots_information(&self) -> Vec<SlotInfo>;

    fn get_free_slot_tracker(&self) -> FreeSlotTracker;

    fn reserve_free_slot(&mut self, allocation_id: &AllocationId, required_profile: &ResourceProfile) -> Result<SlotInfo>;

    fn free_reserved_slot(&mut self, allocation_id: &AllocationId, current_time_millis: i64);

    /// Removes the slot from the pool. Returns `true` if it was known.
    fn release_slot(&mut self, allocation_id: &AllocationId, cause: &str) -> bool;

    /// Releases free slots that idled longer than the idle timeout and are not needed.
    fn release_idle_slots(&mut self, current_time_millis: i64);
}
