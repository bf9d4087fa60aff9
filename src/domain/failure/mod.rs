pub mod error_classification;
pub mod exception_history;
pub mod failure_enricher;
pub mod failure_metric_reporter;
pub mod failure_result;
