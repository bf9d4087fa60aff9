use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::domain::job::job_status::JobStatus;
use crate::domain::utils::id::JobId;

/// Notified on every externally visible job status change.
pub trait JobStatusListener: Send + Sync {
    fn job_status_changes(&self, job_id: JobId, status: JobStatus, timestamp: i64);
}

/// Remembers the latest status and when each status was first reached.
#[derive(Debug, Default)]
pub struct JobStatusStore {
    inner: Mutex<StatusRecord>,
}

#[derive(Debug, Default)]
struct StatusRecord {
    latest: Option<JobStatus>,
    timestamps: BTreeMap<JobStatus, i64>,
    changes: usize,
}

impl JobStatusStore {
    pub fn new() -> Self {
        JobStatusStore::default()
    }

    pub fn latest_status(&self) -> Option<JobStatus> {
        self.inner.lock().expect("Mutex poisoned").latest
    }

    pub fn status_timestamp(&self, status: JobStatus) -> Option<i64> {
        self.inner.lock().expect("Mutex poisoned").timestamps.get(&status).copied()
    }

    pub fn number_of_changes(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").changes
    }
}

impl JobStatusListener for JobStatusStore {
    fn job_status_changes(&self, job_id: JobId, status: JobStatus, timestamp: i64) {
        log::debug!("Job {} switched to {} at {}.", job_id, status, timestamp);
        let mut record = self.inner.lock().expect("Mutex poisoned");
        record.latest = Some(status);
        record.timestamps.entry(status).or_insert(timestamp);
        record.changes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keeps_first_timestamp_per_status() {
        let store = JobStatusStore::new();
        let job_id = JobId::random();

        store.job_status_changes(job_id.clone(), JobStatus::Running, 10);
        store.job_status_changes(job_id.clone(), JobStatus::Restarting, 20);
        store.job_status_changes(job_id, JobStatus::Running, 30);

        assert_eq!(store.latest_status(), Some(JobStatus::Running));
        assert_eq!(store.status_timestamp(JobStatus::Running), Some(10));
        assert_eq!(store.number_of_changes(), 3);
    }
}
