use crate::domain::failure::error_classification::{FailureCause, stringify_failure};
use crate::domain::failure::failure_enricher::{FailureLabelMap, FailureLabels};
use crate::domain::slot_pool::slot_info::TaskManagerLocation;

/// One recorded failure.
#[derive(Debug, Clone)]
pub struct ExceptionHistoryEntry {
    pub exception: String,
    pub timestamp: i64,
    /// Name of the failing subtask, `None` for global failures.
    pub failing_task_name: Option<String>,
    pub task_manager_location: Option<TaskManagerLocation>,
    labels: FailureLabels,
}

impl ExceptionHistoryEntry {
    pub fn from_global_failure(cause: &FailureCause, timestamp: i64, labels: FailureLabels) -> Self {
        ExceptionHistoryEntry {
            exception: stringify_failure(cause),
            timestamp,
            failing_task_name: None,
            task_manager_location: None,
            labels,
        }
    }

    pub fn from_failed_execution(
        cause: &FailureCause,
        timestamp: i64,
        labels: FailureLabels,
        failing_task_name: String,
        task_manager_location: Option<TaskManagerLocation>,
    ) -> Self {
        ExceptionHistoryEntry {
            exception: stringify_failure(cause),
            timestamp,
            failing_task_name: Some(failing_task_name),
            task_manager_location,
            labels,
        }
    }

    pub fn is_global(&self) -> bool {
        self.failing_task_name.is_none()
    }

    /// The failure labels, if the enrichers already finished.
    pub fn failure_labels(&self) -> Option<FailureLabelMap> {
        self.labels.try_get()
    }
}

/// A failure that caused a restart or the end of the job, plus the failures that happened
/// while it was being handled.
#[derive(Debug, Clone)]
pub struct RootExceptionHistoryEntry {
    pub entry: ExceptionHistoryEntry,
    pub concurrent_exceptions: Vec<ExceptionHistoryEntry>,
}

impl RootExceptionHistoryEntry {
    /// The first entry becomes the root, all others are concurrent. `None` for no entries.
    pub fn from_failure_collection(mut failures: Vec<ExceptionHistoryEntry>) -> Option<Self> {
        if failures.is_empty() {
            return None;
        }
        let entry = failures.remove(0);
        Some(RootExceptionHistoryEntry { entry, concurrent_exceptions: failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::failure::error_classification::failure_cause_from_message;

    #[test]
    fn test_first_failure_becomes_root() {
        let first = ExceptionHistoryEntry::from_global_failure(&failure_cause_from_message("first"), 1, FailureLabels::empty());
        let second = ExceptionHistoryEntry::from_global_failure(&failure_cause_from_message("second"), 2, FailureLabels::empty());

        let root = RootExceptionHistoryEntry::from_failure_collection(vec![first, second]).unwrap();

        assert_eq!(root.entry.exception, "first");
        assert_eq!(root.concurrent_exceptions.len(), 1);
        assert!(root.entry.is_global());
    }

    #[test]
    fn test_empty_collection_has_no_root() {
        assert!(RootExceptionHistoryEntry::from_failure_collection(Vec::new()).is_none());
    }
}
