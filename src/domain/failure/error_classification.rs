use std::sync::Arc;

use thiserror::Error;

/// Cause of a task or job failure. Shared because the same cause ends up in the failure
/// decision, the exception history and the archived graph.
pub type FailureCause = Arc<anyhow::Error>;

/// Poison pill: a failure carrying this error anywhere in its chain is never restarted.
#[derive(Debug, Error)]
#[error("Restarts are suppressed: {reason}")]
pub struct SuppressRestartsError {
    pub reason: String,
}

impl SuppressRestartsError {
    pub fn new(reason: impl Into<String>) -> Self {
        SuppressRestartsError { reason: reason.into() }
    }
}

pub fn failure_cause(error: impl Into<anyhow::Error>) -> FailureCause {
    Arc::new(error.into())
}

pub fn failure_cause_from_message(message: impl Into<String>) -> FailureCause {
    Arc::new(anyhow::Error::msg(message.into()))
}

pub fn is_unrecoverable_error(cause: &anyhow::Error) -> bool {
    cause.chain().any(|error| error.downcast_ref::<SuppressRestartsError>().is_some())
}

/// Renders the whole cause chain, outermost first.
pub fn stringify_failure(cause: &anyhow::Error) -> String {
    format!("{:#}", cause)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suppress_restarts_is_found_in_chain() {
        let cause = anyhow::Error::new(SuppressRestartsError::new("poison")).context("task failed");
        assert!(is_unrecoverable_error(&cause));
    }

    #[test]
    fn test_plain_error_is_recoverable() {
        let cause = anyhow::anyhow!("network hiccup");
        assert!(!is_unrecoverable_error(&cause));
    }

    #[test]
    fn test_stringify_includes_context() {
        let cause = anyhow::anyhow!("root").context("outer");
        assert_eq!(stringify_failure(&cause), "outer: root");
    }
}
