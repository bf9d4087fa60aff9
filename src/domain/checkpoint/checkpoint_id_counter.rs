use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::domain::job::job_status::JobStatus;
use crate::error::Result;

pub const INITIAL_CHECKPOINT_ID: u64 = 1;

/// Hands out increasing checkpoint ids.
pub trait CheckpointIdCounter: Send + Sync {
    fn get_and_increment(&self) -> Result<u64>;

    fn get(&self) -> u64;

    fn set_count(&self, count: u64);

    fn shutdown(&self, job_status: JobStatus) -> Result<()>;
}

#[derive(Debug)]
pub struct StandaloneCheckpointIdCounter {
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl StandaloneCheckpointIdCounter {
    pub fn new() -> Self {
        StandaloneCheckpointIdCounter { next_id: AtomicU64::new(INITIAL_CHECKPOINT_ID), shut_down: AtomicBool::new(false) }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for StandaloneCheckpointIdCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointIdCounter for StandaloneCheckpointIdCounter {
    fn get_and_increment(&self) -> Result<u64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn get(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    fn set_count(&self, count: u64) {
        self.next_id.store(count, Ordering::SeqCst);
    }

    fn shutdown(&self, _job_status: JobStatus) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let counter = StandaloneCheckpointIdCounter::new();
        assert_eq!(counter.get_and_increment().unwrap(), 1);
        assert_eq!(counter.get_and_increment().unwrap(), 2);
        assert_eq!(counter.get(), 3);

        counter.set_count(10);
        assert_eq!(counter.get_and_increment().unwrap(), 10);
    }
}
