pub mod job_allocations_information;
pub mod slot_allocator;
pub mod slot_selection;
pub mod slot_sharing_slot_allocator;
