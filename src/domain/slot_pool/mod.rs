pub mod declarative_slot_pool;
pub mod default_declarative_slot_pool;
pub mod free_slot_tracker;
pub mod slot_info;
