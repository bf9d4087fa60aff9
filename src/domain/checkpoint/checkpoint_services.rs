use std::sync::Arc;

use crate::domain::checkpoint::checkpoint_id_counter::{CheckpointIdCounter, StandaloneCheckpointIdCounter};
use crate::domain::checkpoint::checkpoint_stats_tracker::CheckpointStatsTracker;
use crate::domain::checkpoint::completed_checkpoint_store::{CompletedCheckpointStore, StandaloneCompletedCheckpointStore};
use crate::domain::job::job_status::JobStatus;

pub const DEFAULT_CHECKPOINT_HISTORY_SIZE: usize = 10;

/// The checkpoint collaborators of one job. They outlive every execution graph of the job.
#[derive(Clone)]
pub struct CheckpointServices {
    pub completed_checkpoint_store: Arc<dyn CompletedCheckpointStore>,
    pub checkpoint_id_counter: Arc<dyn CheckpointIdCounter>,
    pub checkpoint_stats_tracker: Arc<CheckpointStatsTracker>,
}

impl CheckpointServices {
    pub fn new(
        completed_checkpoint_store: Arc<dyn CompletedCheckpointStore>,
        checkpoint_id_counter: Arc<dyn CheckpointIdCounter>,
        checkpoint_stats_tracker: Arc<CheckpointStatsTracker>,
    ) -> Self {
        CheckpointServices { completed_checkpoint_store, checkpoint_id_counter, checkpoint_stats_tracker }
    }

    pub fn standalone(max_retained_checkpoints: usize) -> Self {
        CheckpointServices::new(
            Arc::new(StandaloneCompletedCheckpointStore::new(max_retained_checkpoints)),
            Arc::new(StandaloneCheckpointIdCounter::new()),
            Arc::new(CheckpointStatsTracker::new(DEFAULT_CHECKPOINT_HISTORY_SIZE)),
        )
    }

    /// Shuts down store and counter. Failures are logged, never propagated.
    pub fn shutdown(&self, job_status: JobStatus) {
        if let Err(e) = self.completed_checkpoint_store.shutdown(job_status) {
            log::warn!("Failed to shut down the completed checkpoint store: {}", e);
        }
        if let Err(e) = self.checkpoint_id_counter.shutdown(job_status) {
            log::warn!("Failed to shut down the checkpoint id counter: {}", e);
        }
    }
}

impl std::fmt::Debug for CheckpointServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointServices")
            .field("retained_checkpoints", &self.completed_checkpoint_store.get_number_of_retained_checkpoints())
            .field("next_checkpoint_id", &self.checkpoint_id_counter.get())
            .finish()
    }
}
