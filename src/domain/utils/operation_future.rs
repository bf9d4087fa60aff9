use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Result of an operation that may finish later, for example a savepoint.
pub type OperationFuture<T> = BoxFuture<'static, Result<T>>;

pub fn completed_future<T: Send + 'static>(value: T) -> OperationFuture<T> {
    futures::future::ready(Ok(value)).boxed()
}

pub fn failed_future<T: Send + 'static>(error: Error) -> OperationFuture<T> {
    futures::future::ready(Err(error)).boxed()
}

/// Completes the paired [`OperationFuture`]. Dropping it fails the future.
#[derive(Debug)]
pub struct OperationCompleter<T> {
    sender: oneshot::Sender<Result<T>>,
}

impl<T> OperationCompleter<T> {
    pub fn complete(self, value: T) {
        self.complete_with(Ok(value));
    }

    pub fn fail(self, error: Error) {
        self.complete_with(Err(error));
    }

    pub fn complete_with(self, result: Result<T>) {
        // Nobody waiting for the result is fine.
        let _ = self.sender.send(result);
    }
}

pub fn operation_future<T: Send + 'static>() -> (OperationCompleter<T>, OperationFuture<T>) {
    let (sender, receiver) = oneshot::channel();
    let future = receiver
        .map(|result| match result {
            Ok(result) => result,
            Err(_) => Err(Error::OperationFailed("The operation was abandoned before it completed.".to_string())),
        })
        .boxed();
    (OperationCompleter { sender }, future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completer_resolves_future() {
        let (completer, future) = operation_future::<u32>();
        completer.complete(5);
        assert_eq!(future.now_or_never().unwrap().unwrap(), 5);
    }

    #[test]
    fn test_dropped_completer_fails_future() {
        let (completer, future) = operation_future::<u32>();
        drop(completer);
        assert!(matches!(future.now_or_never(), Some(Err(Error::OperationFailed(_)))));
    }
}
