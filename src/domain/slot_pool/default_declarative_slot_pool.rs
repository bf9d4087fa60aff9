use slotmap::{SlotMap, new_key_type};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::clock::clock::add_millis;
use crate::domain::resource::resource_counter::ResourceCounter;
use crate::domain::resource::resource_profile::ResourceProfile;
use crate::domain::slot_pool::declarative_slot_pool::{DeclarativeSlotPool, NewSlotsListener};
use crate::domain::slot_pool::free_slot_tracker::{FreeSlotTracker, TaskManagerSlotCounts};
use crate::domain::slot_pool::slot_info::{SlotInfo, SlotOffer, TaskManagerLocation};
use crate::domain::utils::id::{AllocationId, TaskManagerId};
use crate::error::{Error, Result};

new_key_type! {
    pub struct PooledSlotKey;
}

#[derive(Debug)]
struct PooledSlot {
    info: SlotInfo,
    reserved: bool,
    /// Timestamp at which the slot became free.
    idle_since: i64,
}

/// In-memory slot pool.
///
/// Slots live in a slotmap. An allocation id index makes reservations by id cheap.
pub struct DefaultDeclarativeSlotPool {
    slots: SlotMap<PooledSlotKey, PooledSlot>,
    allocation_index: HashMap<AllocationId, PooledSlotKey>,
    requirements: ResourceCounter,
    idle_slot_timeout: Duration,
    new_slots_listener: Option<NewSlotsListener>,
}

impl DefaultDeclarativeSlotPool {
    pub fn new(idle_slot_timeout: Duration) -> Self {
        DefaultDeclarativeSlotPool {
            slots: SlotMap::with_key(),
            allocation_index: HashMap::new(),
            requirements: ResourceCounter::empty(),
            idle_slot_timeout,
            new_slots_listener: None,
        }
    }

    pub fn number_of_slots(&self) -> usize {
        self.slots.len()
    }

    fn task_manager_slot_counts(&self) -> HashMap<TaskManagerId, TaskManagerSlotCounts> {
        let mut counts: HashMap<TaskManagerId, TaskManagerSlotCounts> = HashMap::new();
        for slot in self.slots.values() {
            let entry = counts.entry(slot.info.task_manager.id.clone()).or_default();
            entry.reserved += usize::from(slot.reserved);
            entry.total += 1;
        }
        counts
    }
}

impl DeclarativeSlotPool for DefaultDeclarativeSlotPool {
    fn register_new_slots_listener(&mut self, listener: NewSlotsListener) {
        self.new_slots_listener = Some(listener);
    }

    fn set_resource_requirements(&mut self, requirements: ResourceCounter) {
        log::debug!("Slot pool received new resource requirements {}.", requirements);
        self.requirements = requirements;
    }

    fn get_resource_requirements(&self) -> ResourceCounter {
        self.requirements.clone()
    }

    fn offer_slots(&mut self, offers: Vec<SlotOffer>, task_manager: TaskManagerLocation, current_time_millis: i64) -> Vec<AllocationId> {
        let mut accepted = Vec::new();
        for offer in offers {
            if self.allocation_index.contains_key(&offer.allocation_id) {
                // Already known, the task manager is just repeating its offer.
                accepted.push(offer.allocation_id);
                continue;
            }
            let info = SlotInfo {
                allocation_id: offer.allocation_id.clone(),
                task_manager: task_manager.clone(),
                physical_slot_number: offer.slot_index,
                resource_profile: offer.resource_profile,
            };
            let key = self.slots.insert(PooledSlot { info: info.clone(), reserved: false, idle_since: current_time_millis });
            self.allocation_index.insert(offer.allocation_id.clone(), key);
            accepted.push(offer.allocation_id);
        }

        let new_slots: Vec<SlotInfo> = accepted
            .iter()
            .filter_map(|allocation_id| self.allocation_index.get(allocation_id))
            .filter_map(|key| self.slots.get(*key))
            .map(|slot| slot.info.clone())
            .collect();

        log::debug!("Accepted {} slot(s) from task manager {}.", new_slots.len(), task_manager.id);

        if let Some(listener) = &self.new_slots_listener {
            if !new_slots.is_empty() {
                listener(&new_slots);
            }
        }
        accepted
    }

    fn get_all_slots_information(&self) -> Vec<SlotInfo> {
        self.slots.values().map(|slot| slot.info.clone()).collect()
    }

    fn get_free_slot_tracker(&self) -> FreeSlotTracker {
        let free_slots = self.slots.values().filter(|slot| !slot.reserved).map(|slot| slot.info.clone()).collect();
        FreeSlotTracker::new(free_slots, self.task_manager_slot_counts())
    }

    fn reserve_free_slot(&mut self, allocation_id: &AllocationId, required_profile: &ResourceProfile) -> Result<SlotInfo> {
        let key = self
            .allocation_index
            .get(allocation_id)
            .ok_or_else(|| Error::NoResourceAvailable(format!("Slot {} is not part of the slot pool.", allocation_id)))?;
        let slot = self
            .slots
            .get_mut(*key)
            .ok_or_else(|| Error::NoResourceAvailable(format!("Slot {} is not part of the slot pool.", allocation_id)))?;

        if slot.reserved {
            return Err(Error::NoResourceAvailable(format!("Slot {} is already reserved.", allocation_id)));
        }
        if !slot.info.resource_profile.is_matching(required_profile) {
            return Err(Error::NoResourceAvailable(format!(
                "Slot {} with {} cannot serve {}.",
                allocation_id, slot.info.resource_profile, required_profile
            )));
        }
        slot.reserved = true;
        Ok(slot.info.clone())
    }

    fn free_reserved_slot(&mut self, allocation_id: &AllocationId, current_time_millis: i64) {
        if let Some(slot) = self.allocation_index.get(allocation_id).and_then(|key| self.slots.get_mut(*key)) {
            slot.reserved = false;
            slot.idle_since = current_time_millis;
        }
    }

    fn release_slot(&mut self, allocation_id: &AllocationId, cause: &str) -> bool {
        match self.allocation_index.remove(allocation_id) {
            Some(key) => {
                self.slots.remove(key);
                log::debug!("Released slot {}: {}", allocation_id, cause);
                true
            }
            None => false,
        }
    }

    fn release_idle_slots(&mut self, current_time_millis: i64) {
        let required_slots = self.requirements.get_total_resource_count();
        let mut excess_slots = self.slots.len().saturating_sub(required_slots);
        if excess_slots == 0 {
            return;
        }

        let timed_out: Vec<AllocationId> = self
            .slots
            .values()
            .filter(|slot| !slot.reserved && add_millis(slot.idle_since, self.idle_slot_timeout) <= current_time_millis)
            .map(|slot| slot.info.allocation_id.clone())
            .collect();

        for allocation_id in timed_out {
            if excess_slots == 0 {
                break;
            }
            self.release_slot(&allocation_id, "Slot idle timeout exceeded.");
            excess_slots -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn offers(count: u32) -> Vec<SlotOffer> {
        (0..count).map(|index| SlotOffer::new(index, ResourceProfile::UNKNOWN)).collect()
    }

    #[test]
    fn test_offer_notifies_listener() {
        let mut pool = DefaultDeclarativeSlotPool::new(Duration::from_secs(10));
        let seen = Arc::new(Mutex::new(0));
        let seen_in_listener = seen.clone();
        pool.register_new_slots_listener(Box::new(move |slots| *seen_in_listener.lock().unwrap() += slots.len()));

        let accepted = pool.offer_slots(offers(3), TaskManagerLocation::new("tm-1", "localhost"), 0);

        assert_eq!(accepted.len(), 3);
        assert_eq!(*seen.lock().unwrap(), 3);
        assert_eq!(pool.get_free_slot_tracker().len(), 3);
    }

    #[test]
    fn test_reserved_slot_cannot_be_reserved_twice() {
        let mut pool = DefaultDeclarativeSlotPool::new(Duration::from_secs(10));
        let accepted = pool.offer_slots(offers(1), TaskManagerLocation::new("tm-1", "localhost"), 0);

        assert!(pool.reserve_free_slot(&accepted[0], &ResourceProfile::UNKNOWN).is_ok());
        assert!(matches!(pool.reserve_free_slot(&accepted[0], &ResourceProfile::UNKNOWN), Err(Error::NoResourceAvailable(_))));
        assert!(pool.get_free_slot_tracker().is_empty());
        assert_eq!(pool.get_free_slot_tracker().get_task_executor_utilization(&TaskManagerId::new("tm-1")), 1.0);
    }

    #[test]
    fn test_release_idle_slots_keeps_required_slots() {
        let mut pool = DefaultDeclarativeSlotPool::new(Duration::from_secs(10));
        pool.set_resource_requirements(ResourceCounter::with_resource(ResourceProfile::UNKNOWN, 1));
        pool.offer_slots(offers(3), TaskManagerLocation::new("tm-1", "localhost"), 0);

        pool.release_idle_slots(5_000);
        assert_eq!(pool.number_of_slots(), 3);

        pool.release_idle_slots(10_000);
        assert_eq!(pool.number_of_slots(), 1);
    }
}
