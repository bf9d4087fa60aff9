use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::checkpoint::completed_checkpoint::CompletedCheckpoint;
use crate::domain::job::job_status::JobStatus;
use crate::error::{Error, Result};

/// Keeps the completed checkpoints a job can be restored from.
pub trait CompletedCheckpointStore: Send + Sync {
    /// Adds a checkpoint and returns the checkpoints it subsumed.
    fn add_checkpoint_and_subsume_oldest(&self, checkpoint: CompletedCheckpoint) -> Result<Vec<CompletedCheckpoint>>;

    fn get_latest_checkpoint(&self) -> Option<CompletedCheckpoint>;

    fn get_all_checkpoints(&self) -> Vec<CompletedCheckpoint>;

    fn get_number_of_retained_checkpoints(&self) -> usize;

    /// Globally terminal jobs discard their checkpoints, all others keep them for recovery.
    fn shutdown(&self, job_status: JobStatus) -> Result<()>;
}

#[derive(Debug)]
struct StoreState {
    checkpoints: VecDeque<CompletedCheckpoint>,
    shut_down: bool,
}

/// In-memory store retaining the last `max_retained_checkpoints` checkpoints.
#[derive(Debug)]
pub struct StandaloneCompletedCheckpointStore {
    max_retained_checkpoints: usize,
    state: Mutex<StoreState>,
}

impl StandaloneCompletedCheckpointStore {
    pub fn new(max_retained_checkpoints: usize) -> Self {
        StandaloneCompletedCheckpointStore {
            max_retained_checkpoints: max_retained_checkpoints.max(1),
            state: Mutex::new(StoreState { checkpoints: VecDeque::new(), shut_down: false }),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().expect("Mutex poisoned").shut_down
    }
}

impl CompletedCheckpointStore for StandaloneCompletedCheckpointStore {
    fn add_checkpoint_and_subsume_oldest(&self, checkpoint: CompletedCheckpoint) -> Result<Vec<CompletedCheckpoint>> {
        let mut state = self.state.lock().expect("Mutex poisoned");
        if state.shut_down {
            return Err(Error::OperationFailed("The completed checkpoint store has been shut down.".to_string()));
        }
        state.checkpoints.push_back(checkpoint);

        let mut subsumed = Vec::new();
        while state.checkpoints.len() > self.max_retained_checkpoints {
            if let Some(oldest) = state.checkpoints.pop_front() {
                subsumed.push(oldest);
            }
        }
        Ok(subsumed)
    }

    fn get_latest_checkpoint(&self) -> Option<CompletedCheckpoint> {
        self.state.lock().expect("Mutex poisoned").checkpoints.back().cloned()
    }

    fn get_all_checkpoints(&self) -> Vec<CompletedCheckpoint> {
        self.state.lock().expect("Mutex poisoned").checkpoints.iter().cloned().collect()
    }

    fn get_number_of_retained_checkpoints(&self) -> usize {
        self.state.lock().expect("Mutex poisoned").checkpoints.len()
    }

    fn shutdown(&self, job_status: JobStatus) -> Result<()> {
        let mut state = self.state.lock().expect("Mutex poisoned");
        if job_status.is_globally_terminal_state() {
            log::info!("Discarding {} completed checkpoints on shutdown ({}).", state.checkpoints.len(), job_status);
            state.checkpoints.clear();
        }
        state.shut_down = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, CheckpointType};
    use crate::domain::utils::id::JobId;

    fn checkpoint(id: u64) -> CompletedCheckpoint {
        CompletedCheckpoint {
            job_id: JobId::new("job"),
            checkpoint_id: id,
            timestamp: 0,
            completion_timestamp: 0,
            properties: CheckpointProperties::checkpoint(CheckpointType::Configured),
            external_pointer: format!("chk-{}", id),
            vertex_max_parallelism: Default::default(),
        }
    }

    #[test]
    fn test_oldest_checkpoints_are_subsumed() {
        let store = StandaloneCompletedCheckpointStore::new(2);
        store.add_checkpoint_and_subsume_oldest(checkpoint(1)).unwrap();
        store.add_checkpoint_and_subsume_oldest(checkpoint(2)).unwrap();
        let subsumed = store.add_checkpoint_and_subsume_oldest(checkpoint(3)).unwrap();

        assert_eq!(subsumed.len(), 1);
        assert_eq!(subsumed[0].checkpoint_id, 1);
        assert_eq!(store.get_latest_checkpoint().unwrap().checkpoint_id, 3);
        assert_eq!(store.get_number_of_retained_checkpoints(), 2);
    }

    #[test]
    fn test_suspended_shutdown_keeps_checkpoints() {
        let store = StandaloneCompletedCheckpointStore::new(1);
        store.add_checkpoint_and_subsume_oldest(checkpoint(1)).unwrap();

        store.shutdown(JobStatus::Suspended).unwrap();

        assert!(store.is_shut_down());
        assert_eq!(store.get_number_of_retained_checkpoints(), 1);
    }

    #[test]
    fn test_globally_terminal_shutdown_discards_checkpoints() {
        let store = StandaloneCompletedCheckpointStore::new(1);
        store.add_checkpoint_and_subsume_oldest(checkpoint(1)).unwrap();

        store.shutdown(JobStatus::Finished).unwrap();

        assert!(store.get_latest_checkpoint().is_none());
        assert!(store.add_checkpoint_and_subsume_oldest(checkpoint(2)).is_err());
    }
}
