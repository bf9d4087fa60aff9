use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::runtime::Handle;

/// Handle to a computation running on the I/O executor whose result may be superseded.
///
/// Every task has a generation one higher than the task it runs after. An aborted task still
/// runs to completion if it already started, but its result is never delivered.
pub struct BackgroundTask {
    generation: u64,
    aborted: Arc<AtomicBool>,
    termination: Shared<BoxFuture<'static, ()>>,
}

impl BackgroundTask {
    /// A task that already finished. Chaining after it starts right away.
    pub fn finished() -> Self {
        BackgroundTask { generation: 0, aborted: Arc::new(AtomicBool::new(false)), termination: futures::future::ready(()).boxed().shared() }
    }

    /// Runs `work` once this task terminated and hands its output to `on_result`, unless the
    /// returned task is aborted first.
    pub fn run_after<T, W, C>(&self, work: W, io_executor: &Handle, on_result: C) -> BackgroundTask
    where
        T: Send + 'static,
        W: Future<Output = T> + Send + 'static,
        C: FnOnce(T) + Send + 'static,
    {
        let previous_termination = self.termination.clone();
        let aborted = Arc::new(AtomicBool::new(false));
        let abort_flag = aborted.clone();
        let generation = self.generation + 1;

        let running = io_executor.spawn(async move {
            previous_termination.await;
            if abort_flag.load(Ordering::SeqCst) {
                log::debug!("Background task {} was aborted before it started.", generation);
                return;
            }
            let result = work.await;
            if abort_flag.load(Ordering::SeqCst) {
                log::debug!("Discarding the result of aborted background task {}.", generation);
                return;
            }
            on_result(result);
        });

        let termination = async move {
            if let Err(e) = running.await {
                log::warn!("Background task {} did not complete: {}", generation, e);
            }
        }
        .boxed()
        .shared();

        BackgroundTask { generation, aborted, termination }
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolves once the work finished or was skipped, whatever its outcome.
    pub fn termination_future(&self) -> Shared<BoxFuture<'static, ()>> {
        self.termination.clone()
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask").field("generation", &self.generation).field("aborted", &self.is_aborted()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap()
    }

    #[test]
    fn test_result_is_delivered() {
        let runtime = runtime();
        let (tx, rx) = mpsc::channel();

        let task = BackgroundTask::finished().run_after(async { 42 }, runtime.handle(), move |value| tx.send(value).unwrap());

        assert_eq!(task.generation(), 1);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_aborted_task_result_is_discarded() {
        let runtime = runtime();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (tx, rx) = mpsc::channel();

        let task = BackgroundTask::finished().run_after(
            async move {
                let _ = release_rx.await;
                "stale"
            },
            runtime.handle(),
            move |value| tx.send(value).unwrap(),
        );
        task.abort();
        release_tx.send(()).unwrap();

        runtime.block_on(task.termination_future());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_chained_task_runs_after_previous_terminated() {
        let runtime = runtime();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let (tx, rx) = mpsc::channel();
        let first_tx = tx.clone();

        let first = BackgroundTask::finished().run_after(
            async move {
                let _ = release_rx.await;
                "first"
            },
            runtime.handle(),
            move |value| first_tx.send(value).unwrap(),
        );
        let second = first.run_after(async { "second" }, runtime.handle(), move |value| tx.send(value).unwrap());

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        release_tx.send(()).unwrap();
        runtime.block_on(second.termination_future());

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "first");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
        assert_eq!(second.generation(), 2);
    }
}
