use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::runtime::Handle;

use crate::domain::failure::error_classification::FailureCause;
use crate::domain::utils::id::JobId;

pub type FailureLabelMap = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// A single task failed.
    Task,
    /// The whole job failed, for example because a coordinator failed.
    Global,
}

#[derive(Debug, Clone)]
pub struct FailureEnricherContext {
    pub job_id: JobId,
    pub job_name: String,
    pub failure_type: FailureType,
}

/// Attaches labels to failures, for example to tell user errors from infrastructure errors.
#[async_trait]
pub trait FailureEnricher: Send + Sync {
    /// The only keys this enricher may produce.
    fn output_keys(&self) -> HashSet<String>;

    async fn process_failure(&self, cause: FailureCause, context: FailureEnricherContext) -> anyhow::Result<FailureLabelMap>;
}

/// Labels of one failure. May still be computed while the failure is already being handled.
#[derive(Clone)]
pub struct FailureLabels(Shared<BoxFuture<'static, FailureLabelMap>>);

impl FailureLabels {
    pub fn ready(labels: FailureLabelMap) -> Self {
        FailureLabels(futures::future::ready(labels).boxed().shared())
    }

    pub fn empty() -> Self {
        FailureLabels::ready(FailureLabelMap::new())
    }

    pub fn from_future(labels: BoxFuture<'static, FailureLabelMap>) -> Self {
        FailureLabels(labels.shared())
    }

    /// The labels if they are already known.
    pub fn try_get(&self) -> Option<FailureLabelMap> {
        self.0.clone().now_or_never()
    }

    pub fn future(&self) -> Shared<BoxFuture<'static, FailureLabelMap>> {
        self.0.clone()
    }
}

impl fmt::Debug for FailureLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.peek() {
            Some(labels) => f.debug_tuple("FailureLabels").field(labels).finish(),
            None => f.write_str("FailureLabels(<pending>)"),
        }
    }
}

/// Runs every enricher on the I/O executor and merges their labels.
///
/// Keys an enricher did not declare are dropped, failing enrichers are logged and skipped.
pub fn label_failure(
    cause: FailureCause,
    context: FailureEnricherContext,
    enrichers: &[Arc<dyn FailureEnricher>],
    io_executor: &Handle,
) -> FailureLabels {
    if enrichers.is_empty() {
        return FailureLabels::empty();
    }

    let enrichers = enrichers.to_vec();
    let labelling = io_executor.spawn(async move {
        let enrichments = enrichers.iter().map(|enricher| {
            let output_keys = enricher.output_keys();
            let cause = cause.clone();
            let context = context.clone();
            async move {
                match enricher.process_failure(cause, context).await {
                    Ok(labels) => labels.into_iter().filter(|(key, _)| output_keys.contains(key)).collect::<Vec<_>>(),
                    Err(e) => {
                        log::warn!("Failure enricher failed to process failure: {:#}", e);
                        Vec::new()
                    }
                }
            }
        });

        let mut merged = FailureLabelMap::new();
        for labels in futures::future::join_all(enrichments).await {
            for (key, value) in labels {
                merged.entry(key).or_insert(value);
            }
        }
        merged
    });

    FailureLabels::from_future(
        async move {
            labelling.await.unwrap_or_else(|e| {
                log::warn!("Failure labelling did not complete: {}", e);
                FailureLabelMap::new()
            })
        }
        .boxed(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::failure::error_classification::failure_cause_from_message;

    struct StaticEnricher {
        labels: FailureLabelMap,
        keys: HashSet<String>,
    }

    #[async_trait]
    impl FailureEnricher for StaticEnricher {
        fn output_keys(&self) -> HashSet<String> {
            self.keys.clone()
        }

        async fn process_failure(&self, _cause: FailureCause, _context: FailureEnricherContext) -> anyhow::Result<FailureLabelMap> {
            Ok(self.labels.clone())
        }
    }

    struct BrokenEnricher;

    #[async_trait]
    impl FailureEnricher for BrokenEnricher {
        fn output_keys(&self) -> HashSet<String> {
            HashSet::from(["type".to_string()])
        }

        async fn process_failure(&self, _cause: FailureCause, _context: FailureEnricherContext) -> anyhow::Result<FailureLabelMap> {
            Err(anyhow::anyhow!("enricher crashed"))
        }
    }

    fn context() -> FailureEnricherContext {
        FailureEnricherContext { job_id: JobId::new("job"), job_name: "job".to_string(), failure_type: FailureType::Task }
    }

    #[test]
    fn test_undeclared_keys_are_dropped_and_errors_skipped() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let enricher: Arc<dyn FailureEnricher> = Arc::new(StaticEnricher {
            labels: HashMap::from([("type".to_string(), "user".to_string()), ("secret".to_string(), "x".to_string())]),
            keys: HashSet::from(["type".to_string()]),
        });
        let broken: Arc<dyn FailureEnricher> = Arc::new(BrokenEnricher);

        let labels = label_failure(failure_cause_from_message("boom"), context(), &[enricher, broken], runtime.handle());
        let resolved = runtime.block_on(labels.future());

        assert_eq!(resolved, HashMap::from([("type".to_string(), "user".to_string())]));
        assert_eq!(labels.try_get(), Some(resolved));
    }

    #[test]
    fn test_no_enrichers_resolve_immediately() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let labels = label_failure(failure_cause_from_message("boom"), context(), &[], runtime.handle());
        assert_eq!(labels.try_get(), Some(FailureLabelMap::new()));
    }
}
