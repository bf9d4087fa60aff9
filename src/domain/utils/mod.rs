pub mod bounded_fifo_queue;
pub mod id;
pub mod operation_future;
