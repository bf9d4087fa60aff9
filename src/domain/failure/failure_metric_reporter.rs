use crate::domain::failure::failure_enricher::FailureLabelMap;
use crate::domain::failure::failure_result::FailureResult;
use crate::domain::utils::id::JobId;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportedJobFailure {
    pub timestamp: i64,
    pub restartable: bool,
    pub labels: FailureLabelMap,
}

/// Counts classified failures and emits one structured event per failure.
///
/// Reports arrive only after the failure labels resolved, so they may lag behind the decision.
#[derive(Debug)]
pub struct JobFailureMetricReporter {
    job_id: JobId,
    reported_failures: Vec<ReportedJobFailure>,
}

impl JobFailureMetricReporter {
    pub fn new(job_id: JobId) -> Self {
        JobFailureMetricReporter { job_id, reported_failures: Vec::new() }
    }

    pub fn report_job_failure(&mut self, failure_result: &FailureResult, labels: FailureLabelMap) {
        let restartable = failure_result.is_restartable();
        let mut label_pairs: Vec<String> = labels.iter().map(|(key, value)| format!("{}={}", key, value)).collect();
        label_pairs.sort();

        tracing::info!(
            job_id = %self.job_id,
            restartable,
            timestamp = failure_result.timestamp(),
            labels = %label_pairs.join(","),
            "Job failure reported"
        );

        self.reported_failures.push(ReportedJobFailure { timestamp: failure_result.timestamp(), restartable, labels });
    }

    pub fn reported_failures(&self) -> &[ReportedJobFailure] {
        &self.reported_failures
    }

    pub fn number_of_restartable_failures(&self) -> usize {
        self.reported_failures.iter().filter(|failure| failure.restartable).count()
    }

    pub fn number_of_non_restartable_failures(&self) -> usize {
        self.reported_failures.iter().filter(|failure| !failure.restartable).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::failure::error_classification::failure_cause_from_message;
    use std::collections::HashMap;
    use std::time::Duration;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_report_emits_structured_event() {
        let mut reporter = JobFailureMetricReporter::new(JobId::new("job-1"));
        let result = FailureResult::can_restart(failure_cause_from_message("boom"), 42, Duration::from_secs(1));

        reporter.report_job_failure(&result, HashMap::from([("type".to_string(), "user".to_string())]));

        assert_eq!(reporter.number_of_restartable_failures(), 1);
        assert_eq!(reporter.number_of_non_restartable_failures(), 0);
        assert!(logs_contain("Job failure reported"));
        assert!(logs_contain("type=user"));
    }
}
