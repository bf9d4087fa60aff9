use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::domain::allocator::job_allocations_information::JobAllocationsInformation;
use crate::domain::allocator::slot_allocator::{SlotAllocator, VertexParallelism};
use crate::domain::checkpoint::checkpoint_services::CheckpointServices;
use crate::domain::checkpoint::completed_checkpoint::SavepointFormatType;
use crate::domain::clock::clock::SharedClock;
use crate::domain::execution::archived_execution_graph::ArchivedExecutionGraph;
use crate::domain::execution::execution_graph_factory::ExecutionGraphFactory;
use crate::domain::execution::vertex_attempt_number_store::VertexAttemptNumberStore;
use crate::domain::failure::error_classification::{FailureCause, is_unrecoverable_error};
use crate::domain::failure::exception_history::{ExceptionHistoryEntry, RootExceptionHistoryEntry};
use crate::domain::failure::failure_enricher::{FailureEnricher, FailureEnricherContext, FailureLabels, FailureType, label_failure};
use crate::domain::failure::failure_metric_reporter::JobFailureMetricReporter;
use crate::domain::failure::failure_result::FailureResult;
use crate::domain::job::job_information::JobGraphJobInformation;
use crate::domain::job::job_status::JobStatus;
use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::domain::resource::resource_counter::{ResourceCounter, has_desired_resources};
use crate::domain::restart::restart_backoff_time_strategy::RestartBackoffTimeStrategy;
use crate::domain::scheduler::background_task::BackgroundTask;
use crate::domain::scheduler::fatal_error_handler::FatalErrorHandler;
use crate::domain::scheduler::job_status_listener::JobStatusListener;
use crate::domain::scheduler::main_thread::MainThreadExecutor;
use crate::domain::scheduler::settings::Settings;
use crate::domain::scheduler::states::canceling::Canceling;
use crate::domain::scheduler::states::creating_execution_graph::CreatingExecutionGraph;
use crate::domain::scheduler::states::executing::Executing;
use crate::domain::scheduler::states::failing::Failing;
use crate::domain::scheduler::states::finished::Finished;
use crate::domain::scheduler::states::restarting::Restarting;
use crate::domain::scheduler::states::state_with_execution_graph::ExecutionGraphHolder;
use crate::domain::scheduler::states::stop_with_savepoint::StopWithSavepoint;
use crate::domain::scheduler::states::waiting_for_resources::WaitingForResources;
use crate::domain::scheduler::states::{State, StateFactory, StateKind, StateVariant};
use crate::domain::slot_pool::declarative_slot_pool::DeclarativeSlotPool;
use crate::domain::utils::bounded_fifo_queue::BoundedFifoQueue;
use crate::domain::utils::id::AllocationId;
use crate::domain::utils::operation_future::OperationCompleter;

pub const CONCURRENT_TRANSITION_MESSAGE: &str = "State transitions must not be triggered while another state transition is in progress.";

/// Resolves with the terminal job status once the scheduler reached Finished.
pub type JobTerminationFuture = Shared<BoxFuture<'static, Option<JobStatus>>>;

/// A transition requested by the current state, installed once the state hands back control.
pub struct PendingTransition {
    pub target: StateKind,
    pub factory: StateFactory,
}

/// Everything the states share: the collaborators of the scheduler plus its bookkeeping.
///
/// States only request transitions through the `go_to_*` methods. The scheduler installs the
/// requested state after the current state returned.
pub struct SchedulerContext {
    pub job_information: JobGraphJobInformation,
    /// Parallelism computed at submission, before any requirement update.
    pub initial_parallelism_store: VertexParallelismStore,
    pub settings: Settings,
    pub slot_pool: Box<dyn DeclarativeSlotPool>,
    pub slot_allocator: Box<dyn SlotAllocator>,
    pub restart_strategy: Box<dyn RestartBackoffTimeStrategy>,
    pub execution_graph_factory: Arc<dyn ExecutionGraphFactory>,
    pub checkpoint_services: CheckpointServices,
    pub failure_enrichers: Vec<Arc<dyn FailureEnricher>>,
    pub failure_metric_reporter: JobFailureMetricReporter,
    pub exception_history: BoundedFifoQueue<RootExceptionHistoryEntry>,
    pub attempt_numbers: VertexAttemptNumberStore,
    pub previous_allocations: JobAllocationsInformation,
    pub job_status_listeners: Vec<Arc<dyn JobStatusListener>>,
    pub main_thread: MainThreadExecutor,
    pub io_executor: Handle,
    pub clock: SharedClock,
    pub fatal_error_handler: Arc<dyn FatalErrorHandler>,
    pub background_task: BackgroundTask,
    /// Incremented with every installed state. Delayed actions of a left state compare unequal.
    pub state_epoch: u64,
    pub is_transitioning_state: bool,
    pub pending_transition: Option<PendingTransition>,
    pub desired_resources: ResourceCounter,
    pub num_restarts: u64,
    pub num_rescales: u64,
    pub initialization_timestamp: i64,
    job_termination_completer: Option<oneshot::Sender<JobStatus>>,
    job_termination_future: JobTerminationFuture,
}

impl SchedulerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_information: JobGraphJobInformation,
        settings: Settings,
        slot_pool: Box<dyn DeclarativeSlotPool>,
        slot_allocator: Box<dyn SlotAllocator>,
        restart_strategy: Box<dyn RestartBackoffTimeStrategy>,
        execution_graph_factory: Arc<dyn ExecutionGraphFactory>,
        checkpoint_services: CheckpointServices,
        failure_enrichers: Vec<Arc<dyn FailureEnricher>>,
        job_status_listeners: Vec<Arc<dyn JobStatusListener>>,
        main_thread: MainThreadExecutor,
        io_executor: Handle,
        fatal_error_handler: Arc<dyn FatalErrorHandler>,
    ) -> Self {
        let clock = main_thread.clock().clone();
        let (termination_sender, termination_receiver) = oneshot::channel();
        let initial_parallelism_store = job_information.parallelism_store().clone();

        SchedulerContext {
            failure_metric_reporter: JobFailureMetricReporter::new(job_information.job_id().clone()),
            exception_history: BoundedFifoQueue::new(settings.max_exception_history_size),
            initial_parallelism_store,
            job_information,
            settings,
            slot_pool,
            slot_allocator,
            restart_strategy,
            execution_graph_factory,
            checkpoint_services,
            failure_enrichers,
            attempt_numbers: VertexAttemptNumberStore::new(),
            previous_allocations: JobAllocationsInformation::empty(),
            job_status_listeners,
            main_thread,
            io_executor,
            initialization_timestamp: clock.current_time_millis(),
            clock,
            fatal_error_handler,
            background_task: BackgroundTask::finished(),
            state_epoch: 0,
            is_transitioning_state: false,
            pending_transition: None,
            desired_resources: ResourceCounter::empty(),
            num_restarts: 0,
            num_rescales: 0,
            job_termination_completer: Some(termination_sender),
            job_termination_future: termination_receiver.map(|status| status.ok()).boxed().shared(),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.current_time_millis()
    }

    // ------------------------------------------------------------------
    // transitions
    // ------------------------------------------------------------------

    fn request_transition(&mut self, target: StateKind, factory: StateFactory) {
        if self.is_transitioning_state || self.pending_transition.is_some() {
            panic!("{}", CONCURRENT_TRANSITION_MESSAGE);
        }
        self.pending_transition = Some(PendingTransition { target, factory });
    }

    pub fn go_to_waiting_for_resources(&mut self, previous: Option<ArchivedExecutionGraph>) {
        self.request_transition(
            StateKind::WaitingForResources,
            Box::new(move |_, ctx| State::WaitingForResources(WaitingForResources::new(previous, ctx))),
        );
    }

    pub fn go_to_creating_execution_graph(&mut self, previous: Option<ArchivedExecutionGraph>) {
        self.request_transition(
            StateKind::CreatingExecutionGraph,
            Box::new(move |_, ctx| State::CreatingExecutionGraph(CreatingExecutionGraph::new(previous, ctx))),
        );
    }

    /// Without a holder, the execution graph of the current state is carried over.
    pub fn go_to_executing(&mut self, holder: Option<ExecutionGraphHolder>) {
        self.request_transition(
            StateKind::Executing,
            Box::new(move |old, ctx| {
                let holder = holder.unwrap_or_else(|| old.into_execution_graph_holder(StateKind::Executing));
                State::Executing(Executing::new(holder, ctx))
            }),
        );
    }

    /// Restarts with an empty failure collection count as rescales.
    pub fn go_to_restarting(&mut self, backoff_time: Duration) {
        self.request_transition(
            StateKind::Restarting,
            Box::new(move |old, ctx| {
                let holder = old.into_execution_graph_holder(StateKind::Restarting);
                ctx.num_restarts += 1;
                if holder.failure_collection.is_empty() {
                    ctx.num_rescales += 1;
                }
                for (execution_vertex, attempt_number) in holder.graph.current_attempt_numbers() {
                    ctx.attempt_numbers.set_attempt_count(execution_vertex, attempt_number + 1);
                }
                State::Restarting(Restarting::new(holder, backoff_time, ctx))
            }),
        );
    }

    pub fn go_to_canceling(&mut self) {
        self.request_transition(
            StateKind::Canceling,
            Box::new(|old, ctx| State::Canceling(Canceling::new(old.into_execution_graph_holder(StateKind::Canceling), ctx))),
        );
    }

    pub fn go_to_failing(&mut self, cause: FailureCause) {
        self.request_transition(
            StateKind::Failing,
            Box::new(move |old, ctx| State::Failing(Failing::new(old.into_execution_graph_holder(StateKind::Failing), cause, ctx))),
        );
    }

    pub fn go_to_stop_with_savepoint(
        &mut self,
        target_directory: Option<String>,
        terminate: bool,
        format: SavepointFormatType,
        completer: OperationCompleter<String>,
    ) {
        self.request_transition(
            StateKind::StopWithSavepoint,
            Box::new(move |old, ctx| {
                let holder = old.into_execution_graph_holder(StateKind::StopWithSavepoint);
                State::StopWithSavepoint(StopWithSavepoint::new(holder, target_directory, terminate, format, completer, ctx))
            }),
        );
    }

    pub fn go_to_finished(&mut self, archived_execution_graph: ArchivedExecutionGraph) {
        self.request_transition(
            StateKind::Finished,
            Box::new(move |_, ctx| State::Finished(Finished::new(archived_execution_graph, ctx))),
        );
    }

    // ------------------------------------------------------------------
    // main thread scheduling
    // ------------------------------------------------------------------

    /// Runs `action` on the main thread after `delay` if the state it was scheduled from is
    /// still the current one.
    pub fn run_if_state<S, F>(&self, delay: Duration, action: F)
    where
        S: StateVariant,
        F: FnOnce(&mut S, &mut SchedulerContext) + Send + 'static,
    {
        let epoch = self.state_epoch;
        self.main_thread.schedule(
            Box::new(move |scheduler| {
                scheduler.run_state_action(
                    epoch,
                    Box::new(move |state, ctx| {
                        if let Some(variant) = S::downcast(state) {
                            action(variant, ctx);
                        }
                    }),
                )
            }),
            delay,
        );
    }

    // ------------------------------------------------------------------
    // resources
    // ------------------------------------------------------------------

    /// Whether every desired resource is matched by a slot of the pool.
    pub fn has_desired_resources(&self) -> bool {
        let slots = self.slot_pool.get_all_slots_information();
        has_desired_resources(&self.desired_resources, slots.iter().map(|slot| &slot.resource_profile))
    }

    /// Whether the slots of the pool satisfy every lower parallelism bound.
    pub fn has_sufficient_resources(&self) -> bool {
        self.available_vertex_parallelism().is_some()
    }

    pub fn available_vertex_parallelism(&self) -> Option<VertexParallelism> {
        let slots = self.slot_pool.get_all_slots_information();
        self.slot_allocator.determine_parallelism(&self.job_information, &slots)
    }

    /// Declares the resources of the current requirements, unless they are already declared.
    pub fn declare_desired_resources(&mut self) {
        let desired_resources = self.slot_allocator.calculate_required_slots(&self.job_information);
        if desired_resources == self.desired_resources {
            return;
        }
        log::debug!("Declaring desired resources {} for job {}.", desired_resources, self.job_information.job_id());
        self.desired_resources = desired_resources.clone();
        self.slot_pool.set_resource_requirements(desired_resources);
    }

    pub fn free_slots(&mut self, allocations: impl IntoIterator<Item = AllocationId>) {
        let now = self.now();
        for allocation in allocations {
            self.slot_pool.free_reserved_slot(&allocation, now);
        }
    }

    // ------------------------------------------------------------------
    // failures
    // ------------------------------------------------------------------

    pub fn label_failure(&self, cause: &FailureCause, failure_type: FailureType) -> FailureLabels {
        let context = FailureEnricherContext {
            job_id: self.job_information.job_id().clone(),
            job_name: self.job_information.name().to_string(),
            failure_type,
        };
        label_failure(cause.clone(), context, &self.failure_enrichers, &self.io_executor)
    }

    /// Decides between restart and failure. The decision never waits for the labels, the metric
    /// report is sent once they resolved.
    pub fn how_to_handle_failure(&mut self, cause: &FailureCause, labels: FailureLabels) -> FailureResult {
        let now = self.now();
        let result = if is_unrecoverable_error(cause) {
            FailureResult::can_not_restart(cause.clone(), now, "The failure is not recoverable.")
        } else {
            if !self.restart_strategy.notify_failure(cause) {
                log::debug!("Failure of job {} was merged into the current attempt.", self.job_information.job_id());
            }
            if self.restart_strategy.can_restart() {
                FailureResult::can_restart(cause.clone(), now, self.restart_strategy.get_backoff_time())
            } else {
                FailureResult::can_not_restart(cause.clone(), now, format!("Recovery is suppressed by {}", self.restart_strategy))
            }
        };

        let main_thread = self.main_thread.clone();
        let reported = result.clone();
        self.io_executor.spawn(async move {
            let labels = labels.future().await;
            main_thread.execute(Box::new(move |scheduler| {
                scheduler.context_mut().failure_metric_reporter.report_job_failure(&reported, labels);
            }));
        });

        result
    }

    /// Moves a failure collection into the exception history.
    pub fn archive_failures(&mut self, failures: Vec<ExceptionHistoryEntry>) {
        if let Some(root) = RootExceptionHistoryEntry::from_failure_collection(failures) {
            log::debug!("Archiving failure '{}' with {} concurrent failures.", root.entry.exception, root.concurrent_exceptions.len());
            self.exception_history.add(root);
        }
    }

    // ------------------------------------------------------------------
    // termination
    // ------------------------------------------------------------------

    pub fn complete_job_termination(&mut self, status: JobStatus) {
        if let Some(completer) = self.job_termination_completer.take() {
            // Nobody waiting for termination is fine.
            let _ = completer.send(status);
        }
    }

    pub fn job_termination_future(&self) -> JobTerminationFuture {
        self.job_termination_future.clone()
    }
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("job_id", self.job_information.job_id())
            .field("state_epoch", &self.state_epoch)
            .field("num_restarts", &self.num_restarts)
            .field("num_rescales", &self.num_rescales)
            .finish()
    }
}
