pub mod allocator;
pub mod checkpoint;
pub mod clock;
pub mod execution;
pub mod failure;
pub mod job;
pub mod resource;
pub mod restart;
pub mod scheduler;
pub mod slot_pool;
pub mod utils;
