#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use adaptive_scheduler::domain::clock::clock_mock::ManualClock;
use adaptive_scheduler::domain::execution::execution_state::{ExecutionState, TaskExecutionStateTransition};
use adaptive_scheduler::domain::job::job_graph::{JobGraph, JobVertex};
use adaptive_scheduler::domain::resource::resource_profile::ResourceProfile;
use adaptive_scheduler::domain::scheduler::adaptive_scheduler::{AdaptiveScheduler, AdaptiveSchedulerBuilder};
use adaptive_scheduler::domain::scheduler::fatal_error_handler::FatalErrorHandler;
use adaptive_scheduler::domain::scheduler::job_status_listener::JobStatusStore;
use adaptive_scheduler::domain::scheduler::settings::{SchedulerExecutionMode, Settings};
use adaptive_scheduler::domain::scheduler::states::StateKind;
use adaptive_scheduler::domain::slot_pool::slot_info::{SlotOffer, TaskManagerLocation};
use adaptive_scheduler::domain::utils::id::JobVertexId;

const DRIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Collects fatal errors instead of terminating the test process.
#[derive(Debug, Default)]
pub struct RecordingFatalErrorHandler {
    errors: Mutex<Vec<String>>,
}

impl RecordingFatalErrorHandler {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().expect("Mutex poisoned").clone()
    }
}

impl FatalErrorHandler for RecordingFatalErrorHandler {
    fn on_fatal_error(&self, error: String) {
        self.errors.lock().expect("Mutex poisoned").push(error);
    }
}

/// A scheduler built on the test thread plus the handles the tests inspect it through.
pub struct TestScheduler {
    pub scheduler: AdaptiveScheduler,
    pub clock: ManualClock,
    pub statuses: Arc<JobStatusStore>,
    pub fatal_errors: Arc<RecordingFatalErrorHandler>,
    pub runtime: tokio::runtime::Runtime,
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread().worker_threads(2).enable_all().build().unwrap()
}

pub fn single_vertex_job(parallelism: u32) -> (JobGraph, JobVertexId) {
    let mut job_graph = JobGraph::new("test-job");
    let vertex = job_graph.add_vertex(JobVertex::new("source", parallelism));
    (job_graph, vertex)
}

/// Settings without any waiting, so the tests only wait for the background tasks.
pub fn eager_settings(execution_mode: SchedulerExecutionMode) -> Settings {
    Settings {
        submission_resource_stabilization_timeout: Duration::ZERO,
        executing_cooldown_timeout: Duration::ZERO,
        executing_resource_stabilization_timeout: Duration::ZERO,
        maximum_delay_for_triggering_rescale: Duration::ZERO,
        ..Settings::for_mode(execution_mode, None)
    }
}

pub fn build(job_graph: JobGraph, configure: impl FnOnce(AdaptiveSchedulerBuilder) -> AdaptiveSchedulerBuilder) -> TestScheduler {
    let runtime = runtime();
    let clock = ManualClock::new(1_000);
    let statuses = Arc::new(JobStatusStore::new());
    let fatal_errors = Arc::new(RecordingFatalErrorHandler::default());

    let builder = AdaptiveSchedulerBuilder::new(job_graph, runtime.handle().clone())
        .settings(eager_settings(SchedulerExecutionMode::Default))
        .clock(Arc::new(clock.clone()))
        .job_status_listener(statuses.clone())
        .fatal_error_handler(fatal_errors.clone());
    let scheduler = configure(builder).build().unwrap();

    TestScheduler { scheduler, clock, statuses, fatal_errors, runtime }
}

impl TestScheduler {
    pub fn offer_slots(&mut self, count: u32) -> usize {
        let offers = (0..count).map(|index| SlotOffer::new(index, ResourceProfile::Unknown)).collect();
        let task_manager = TaskManagerLocation::new(format!("tm-{}", uuid::Uuid::new_v4()), "localhost");
        self.scheduler.offer_slots(offers, task_manager).len()
    }

    /// Runs main thread actions until `condition` holds. Panics after a while.
    pub fn drive_until(&mut self, condition: impl Fn(&AdaptiveScheduler) -> bool) {
        let deadline = Instant::now() + DRIVE_TIMEOUT;
        while !condition(&self.scheduler) {
            assert!(Instant::now() < deadline, "Condition not reached, the scheduler is in {}.", self.scheduler.state_kind());
            if self.scheduler.run_ready_actions() == 0 {
                self.scheduler.wait_for_pending_action(Duration::from_millis(20));
            }
        }
    }

    pub fn drive_until_state(&mut self, kind: StateKind) {
        self.drive_until(|scheduler| scheduler.state_kind() == kind);
    }

    /// Runs whatever is ready now and what arrives within `period`.
    pub fn drive_for(&mut self, period: Duration) {
        let deadline = Instant::now() + period;
        while Instant::now() < deadline {
            if self.scheduler.run_ready_actions() == 0 {
                self.scheduler.wait_for_pending_action(Duration::from_millis(10));
            }
        }
        self.scheduler.run_ready_actions();
    }

    /// Starts scheduling, offers `slots` and waits until the job is executing with running tasks.
    pub fn start_and_run(&mut self, slots: u32) {
        self.scheduler.start_scheduling();
        self.offer_slots(slots);
        self.drive_until_state(StateKind::Executing);
        self.report_all(ExecutionState::Running);
    }

    /// Reports `state` for the current attempt of every subtask.
    pub fn report_all(&mut self, state: ExecutionState) {
        for attempt in self.scheduler.current_execution_attempts() {
            self.scheduler.update_task_execution_state(TaskExecutionStateTransition::new(attempt, state));
        }
        self.scheduler.run_ready_actions();
    }
}
