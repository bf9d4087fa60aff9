use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::domain::scheduler::adaptive_scheduler::AdaptiveScheduler;
use crate::domain::scheduler::main_thread::MainThreadExecutor;
use crate::error::{Error, Result};

const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Owns the thread a scheduler lives on and forwards calls to it.
///
/// The scheduler is built on its own thread, which makes that thread its main thread.
pub struct SchedulerHandle {
    name: String,
    main_thread: MainThreadExecutor,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn spawn<B>(name: impl Into<String>, build: B) -> Result<SchedulerHandle>
    where
        B: FnOnce() -> Result<AdaptiveScheduler> + Send + 'static,
    {
        let name = name.into();
        let (ready_tx, ready_rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let loop_running = running.clone();
        let thread_name = name.clone();

        let thread = thread::Builder::new().name(format!("Scheduler-{}", name)).spawn(move || {
            let mut scheduler = match build() {
                Ok(scheduler) => scheduler,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(scheduler.main_thread()));
            log::info!("Scheduler thread {} started.", thread_name);

            while loop_running.load(Ordering::SeqCst) {
                scheduler.run_ready_actions();
                scheduler.wait_for_pending_action(IDLE_WAIT);
            }
            log::info!("Scheduler thread {} stopped.", thread_name);
        })?;

        let main_thread = ready_rx
            .recv()
            .map_err(|_| Error::OperationFailed(format!("Scheduler thread {} died while building the scheduler.", name)))??;

        Ok(SchedulerHandle { name, main_thread, running, thread: Some(thread) })
    }

    /// Runs `f` on the scheduler thread and waits for its result.
    pub fn call<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut AdaptiveScheduler) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.main_thread.execute(Box::new(move |scheduler| {
            let _ = reply_tx.send(f(scheduler));
        }));
        reply_rx.recv().expect("Scheduler thread died unexpectedly")
    }

    /// Runs `f` on the scheduler thread without waiting.
    pub fn tell<F>(&self, f: F)
    where
        F: FnOnce(&mut AdaptiveScheduler) + Send + 'static,
    {
        self.main_thread.execute(Box::new(f));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the scheduler thread after the actions that are ready now.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Wakes the loop up.
        self.main_thread.execute(Box::new(|_| {}));
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Scheduler thread {} panicked.", self.name);
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::job_graph::{JobGraph, JobType, JobVertex};
    use crate::domain::scheduler::adaptive_scheduler::AdaptiveSchedulerBuilder;
    use crate::domain::scheduler::states::StateKind;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread().worker_threads(1).enable_all().build().unwrap()
    }

    #[test]
    fn test_calls_run_on_the_scheduler_thread() {
        let runtime = runtime();
        let io_executor = runtime.handle().clone();
        let handle = SchedulerHandle::spawn("calls", move || {
            let mut job_graph = JobGraph::new("handle-job");
            job_graph.add_vertex(JobVertex::new("source", 1));
            AdaptiveSchedulerBuilder::new(job_graph, io_executor).build()
        })
        .unwrap();

        handle.call(|scheduler| scheduler.start_scheduling());
        let kind = handle.call(|scheduler| scheduler.state_kind());
        assert_eq!(kind, StateKind::WaitingForResources);

        let thread_name = handle.call(|_| thread::current().name().map(str::to_string));
        assert_eq!(thread_name.as_deref(), Some("Scheduler-calls"));
    }

    #[test]
    fn test_told_actions_run_in_order() {
        let runtime = runtime();
        let io_executor = runtime.handle().clone();
        let handle = SchedulerHandle::spawn("tell", move || {
            let mut job_graph = JobGraph::new("tell-job");
            job_graph.add_vertex(JobVertex::new("source", 1));
            AdaptiveSchedulerBuilder::new(job_graph, io_executor).build()
        })
        .unwrap();

        handle.tell(|scheduler| scheduler.start_scheduling());
        handle.tell(|scheduler| scheduler.cancel());

        assert_eq!(handle.call(|scheduler| scheduler.state_kind()), StateKind::Finished);
        assert_eq!(handle.name(), "tell");
    }

    #[test]
    fn test_build_errors_are_returned() {
        let runtime = runtime();
        let io_executor = runtime.handle().clone();
        let result = SchedulerHandle::spawn("batch", move || {
            let mut job_graph = JobGraph::new("batch-job").with_job_type(JobType::Batch);
            job_graph.add_vertex(JobVertex::new("source", 1));
            AdaptiveSchedulerBuilder::new(job_graph, io_executor).build()
        });
        assert!(matches!(result, Err(Error::InvalidJobGraph(_))));
    }
}
