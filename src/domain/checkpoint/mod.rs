pub mod checkpoint_coordinator;
pub mod checkpoint_exception;
pub mod checkpoint_id_counter;
pub mod checkpoint_services;
pub mod checkpoint_stats_tracker;
pub mod completed_checkpoint;
pub mod completed_checkpoint_store;
