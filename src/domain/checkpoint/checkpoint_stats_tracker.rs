use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::domain::checkpoint::checkpoint_exception::CheckpointFailureReason;
use crate::domain::checkpoint::completed_checkpoint::{CheckpointProperties, CompletedCheckpoint};
use crate::domain::utils::bounded_fifo_queue::BoundedFifoQueue;

/// Told about every finished checkpoint. Called from whichever thread reports the outcome.
pub trait CheckpointStatsListener: Send + Sync {
    fn on_completed_checkpoint(&self);

    fn on_failed_checkpoint(&self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointStatsCounts {
    pub number_of_triggered: u64,
    pub number_of_in_progress: u64,
    pub number_of_completed: u64,
    pub number_of_failed: u64,
    pub number_of_restored: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointStatsEntry {
    pub checkpoint_id: u64,
    pub trigger_timestamp: i64,
    pub savepoint: bool,
    pub status: CheckpointStatus,
    pub external_pointer: Option<String>,
    pub failure_reason: Option<CheckpointFailureReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoredCheckpointStats {
    pub checkpoint_id: u64,
    pub restore_timestamp: i64,
    pub external_pointer: String,
}

/// Point-in-time copy of the checkpoint statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointStatsSnapshot {
    pub counts: CheckpointStatsCounts,
    pub history: Vec<CheckpointStatsEntry>,
    pub latest_completed: Option<CheckpointStatsEntry>,
    pub latest_failed: Option<CheckpointStatsEntry>,
    pub latest_restored: Option<RestoredCheckpointStats>,
}

#[derive(Debug)]
struct TrackerState {
    counts: CheckpointStatsCounts,
    history: BoundedFifoQueue<CheckpointStatsEntry>,
    latest_completed: Option<CheckpointStatsEntry>,
    latest_failed: Option<CheckpointStatsEntry>,
    latest_restored: Option<RestoredCheckpointStats>,
}

impl TrackerState {
    /// Moves a tracked checkpoint out of `InProgress`. Unknown ids get a fresh entry.
    fn finish(&mut self, checkpoint_id: u64, status: CheckpointStatus, pointer: Option<String>, reason: Option<CheckpointFailureReason>) -> CheckpointStatsEntry {
        if let Some(entry) = self.history.iter_mut().find(|entry| entry.checkpoint_id == checkpoint_id) {
            if entry.status == CheckpointStatus::InProgress {
                self.counts.number_of_in_progress = self.counts.number_of_in_progress.saturating_sub(1);
            }
            entry.status = status;
            entry.external_pointer = pointer;
            entry.failure_reason = reason;
            return entry.clone();
        }

        let entry = CheckpointStatsEntry {
            checkpoint_id,
            trigger_timestamp: 0,
            savepoint: false,
            status,
            external_pointer: pointer,
            failure_reason: reason,
        };
        self.history.add(entry.clone());
        entry
    }
}

/// Tracks checkpoint statistics. Shared between the scheduler and the checkpoint coordinator.
pub struct CheckpointStatsTracker {
    state: Mutex<TrackerState>,
    listener: Mutex<Option<Arc<dyn CheckpointStatsListener>>>,
}

impl CheckpointStatsTracker {
    pub fn new(history_size: usize) -> Self {
        CheckpointStatsTracker {
            state: Mutex::new(TrackerState {
                counts: CheckpointStatsCounts::default(),
                history: BoundedFifoQueue::new(history_size.max(1)),
                latest_completed: None,
                latest_failed: None,
                latest_restored: None,
            }),
            listener: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: Arc<dyn CheckpointStatsListener>) {
        *self.listener.lock().expect("Mutex poisoned") = Some(listener);
    }

    pub fn report_pending_checkpoint(&self, checkpoint_id: u64, trigger_timestamp: i64, properties: &CheckpointProperties) {
        let mut state = self.state.lock().expect("Mutex poisoned");
        state.counts.number_of_triggered += 1;
        state.counts.number_of_in_progress += 1;
        state.history.add(CheckpointStatsEntry {
            checkpoint_id,
            trigger_timestamp,
            savepoint: properties.is_savepoint(),
            status: CheckpointStatus::InProgress,
            external_pointer: None,
            failure_reason: None,
        });
    }

    pub fn report_completed_checkpoint(&self, checkpoint: &CompletedCheckpoint) {
        {
            let mut state = self.state.lock().expect("Mutex poisoned");
            state.counts.number_of_completed += 1;
            let entry = state.finish(checkpoint.checkpoint_id, CheckpointStatus::Completed, Some(checkpoint.external_pointer.clone()), None);
            state.latest_completed = Some(entry);
        }
        if let Some(listener) = self.current_listener() {
            listener.on_completed_checkpoint();
        }
    }

    pub fn report_failed_checkpoint(&self, checkpoint_id: u64, reason: CheckpointFailureReason) {
        {
            let mut state = self.state.lock().expect("Mutex poisoned");
            state.counts.number_of_failed += 1;
            let entry = state.finish(checkpoint_id, CheckpointStatus::Failed, None, Some(reason));
            state.latest_failed = Some(entry);
        }
        if let Some(listener) = self.current_listener() {
            listener.on_failed_checkpoint();
        }
    }

    pub fn report_restored_checkpoint(&self, checkpoint: &CompletedCheckpoint, restore_timestamp: i64) {
        let mut state = self.state.lock().expect("Mutex poisoned");
        state.counts.number_of_restored += 1;
        state.latest_restored = Some(RestoredCheckpointStats {
            checkpoint_id: checkpoint.checkpoint_id,
            restore_timestamp,
            external_pointer: checkpoint.external_pointer.clone(),
        });
    }

    pub fn create_snapshot(&self) -> CheckpointStatsSnapshot {
        let state = self.state.lock().expect("Mutex poisoned");
        CheckpointStatsSnapshot {
            counts: state.counts,
            history: state.history.to_vec(),
            latest_completed: state.latest_completed.clone(),
            latest_failed: state.latest_failed.clone(),
            latest_restored: state.latest_restored.clone(),
        }
    }

    fn current_listener(&self) -> Option<Arc<dyn CheckpointStatsListener>> {
        self.listener.lock().expect("Mutex poisoned").clone()
    }
}

impl std::fmt::Debug for CheckpointStatsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStatsTracker").field("counts", &self.create_snapshot().counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::checkpoint::completed_checkpoint::CheckpointType;
    use crate::domain::utils::id::JobId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        completed: AtomicUsize,
        failed: AtomicUsize,
    }

    impl CheckpointStatsListener for CountingListener {
        fn on_completed_checkpoint(&self) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed_checkpoint(&self) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_tracks_checkpoint_lifecycle_and_notifies_listener() {
        let tracker = CheckpointStatsTracker::new(10);
        let listener = Arc::new(CountingListener::default());
        tracker.set_listener(listener.clone());
        let properties = CheckpointProperties::checkpoint(CheckpointType::Configured);

        tracker.report_pending_checkpoint(1, 100, &properties);
        tracker.report_pending_checkpoint(2, 200, &properties);
        tracker.report_completed_checkpoint(&CompletedCheckpoint {
            job_id: JobId::new("job"),
            checkpoint_id: 1,
            timestamp: 100,
            completion_timestamp: 150,
            properties: properties.clone(),
            external_pointer: "chk-1".to_string(),
            vertex_max_parallelism: Default::default(),
        });
        tracker.report_failed_checkpoint(2, CheckpointFailureReason::CheckpointDeclined);

        let snapshot = tracker.create_snapshot();
        assert_eq!(snapshot.counts.number_of_triggered, 2);
        assert_eq!(snapshot.counts.number_of_in_progress, 0);
        assert_eq!(snapshot.counts.number_of_completed, 1);
        assert_eq!(snapshot.counts.number_of_failed, 1);
        assert_eq!(snapshot.latest_completed.unwrap().trigger_timestamp, 100);
        assert_eq!(snapshot.latest_failed.unwrap().failure_reason, Some(CheckpointFailureReason::CheckpointDeclined));
        assert_eq!(listener.completed.load(Ordering::SeqCst), 1);
        assert_eq!(listener.failed.load(Ordering::SeqCst), 1);
    }
}
