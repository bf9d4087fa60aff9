use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::domain::allocator::slot_allocator::SlotAllocator;
use crate::domain::allocator::slot_sharing_slot_allocator::SlotSharingSlotAllocator;
use crate::domain::checkpoint::checkpoint_exception::{CheckpointException, CheckpointFailureReason};
use crate::domain::checkpoint::checkpoint_services::CheckpointServices;
use crate::domain::checkpoint::checkpoint_stats_tracker::{CheckpointStatsListener, CheckpointStatsSnapshot};
use crate::domain::checkpoint::completed_checkpoint::{CheckpointType, CompletedCheckpoint, SavepointFormatType};
use crate::domain::clock::clock::{SharedClock, SystemClock};
use crate::domain::execution::archived_execution_graph::ExecutionGraphInfo;
use crate::domain::execution::execution_graph_factory::{DefaultExecutionGraphFactory, ExecutionGraphFactory};
use crate::domain::execution::execution_state::TaskExecutionStateTransition;
use crate::domain::execution::operator_coordinator::{CoordinationRequest, CoordinationResponse, OperatorEvent};
use crate::domain::failure::error_classification::{FailureCause, failure_cause_from_message};
use crate::domain::failure::failure_enricher::{FailureEnricher, FailureLabels, FailureType};
use crate::domain::failure::failure_result::FailureResult;
use crate::domain::job::job_graph::{JobGraph, JobType};
use crate::domain::job::job_information::JobGraphJobInformation;
use crate::domain::job::job_status::JobStatus;
use crate::domain::job::resource_requirements::JobResourceRequirements;
use crate::domain::job::vertex_parallelism::{
    VertexParallelismStore, compute_reactive_mode_vertex_parallelism_store, compute_vertex_parallelism_store, default_max_parallelism_of,
};
use crate::domain::restart::RestartStrategyOptions;
use crate::domain::scheduler::context::{CONCURRENT_TRANSITION_MESSAGE, JobTerminationFuture, PendingTransition, SchedulerContext};
use crate::domain::scheduler::fatal_error_handler::{ExitingFatalErrorHandler, FatalErrorHandler, panic_message};
use crate::domain::scheduler::job_status_listener::JobStatusListener;
use crate::domain::scheduler::main_thread::MainThreadExecutor;
use crate::domain::scheduler::settings::{SchedulerExecutionMode, Settings};
use crate::domain::scheduler::states::created::Created;
use crate::domain::scheduler::states::{State, StateAction, StateKind};
use crate::domain::slot_pool::declarative_slot_pool::DeclarativeSlotPool;
use crate::domain::slot_pool::default_declarative_slot_pool::DefaultDeclarativeSlotPool;
use crate::domain::slot_pool::slot_info::{SlotOffer, TaskManagerLocation};
use crate::domain::utils::id::{AllocationId, ExecutionAttemptId, OperatorId};
use crate::domain::utils::operation_future::{OperationFuture, failed_future};
use crate::error::{Error, Result};

pub const SELF_TRANSITION_MESSAGE: &str = "Attempted to transition into the very state the scheduler is already in.";

/// Named accessor for a scheduler metric.
pub type JobMetricGauge = fn(&AdaptiveScheduler) -> u64;

/// Schedules one streaming job and adapts its parallelism to the available slots.
///
/// All methods must be called from the thread that built the scheduler. Work that completes
/// elsewhere is handed back through the [`MainThreadExecutor`] and runs in [`run_ready_actions`].
///
/// [`run_ready_actions`]: AdaptiveScheduler::run_ready_actions
pub struct AdaptiveScheduler {
    state: State,
    ctx: SchedulerContext,
    main_thread_id: ThreadId,
}

impl AdaptiveScheduler {
    fn assert_running_in_main_thread(&self) {
        assert_eq!(
            thread::current().id(),
            self.main_thread_id,
            "The scheduler must only be accessed from its main thread."
        );
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SchedulerContext {
        &mut self.ctx
    }

    pub fn main_thread(&self) -> MainThreadExecutor {
        self.ctx.main_thread.clone()
    }

    pub fn state_kind(&self) -> StateKind {
        self.state.kind()
    }

    // ------------------------------------------------------------------
    // state transitions
    // ------------------------------------------------------------------

    /// Runs `action` against the current state unless a transition happened since `epoch`.
    pub fn run_state_action(&mut self, epoch: u64, action: StateAction) {
        if epoch != self.ctx.state_epoch {
            log::trace!("Dropping action of state epoch {}, current epoch is {}.", epoch, self.ctx.state_epoch);
            return;
        }
        action(&mut self.state, &mut self.ctx);
        self.apply_pending_transitions();
    }

    fn apply_pending_transitions(&mut self) {
        while let Some(pending) = self.ctx.pending_transition.take() {
            self.transition_to_state(pending);
        }
    }

    fn transition_to_state(&mut self, transition: PendingTransition) {
        if self.ctx.is_transitioning_state {
            panic!("{}", CONCURRENT_TRANSITION_MESSAGE);
        }
        let PendingTransition { target, factory } = transition;
        let source = self.state.kind();
        if source == target {
            panic!("{} State: {}", SELF_TRANSITION_MESSAGE, source);
        }

        self.ctx.is_transitioning_state = true;
        let old_status = self.state.job_status();

        self.state.on_leave(target, &mut self.ctx);
        self.ctx.state_epoch += 1;
        let old_state = std::mem::replace(&mut self.state, State::Transitioning);
        self.state = factory(old_state, &mut self.ctx);

        self.ctx.is_transitioning_state = false;

        let new_status = self.state.job_status();
        tracing::info!(
            job_id = %self.ctx.job_information.job_id(),
            from = %source,
            to = %self.state.kind(),
            status = %new_status,
            "scheduler state transition"
        );
        if old_status != new_status {
            let timestamp = self.ctx.now();
            log::info!("Job {} switched from {} to {}.", self.ctx.job_information.job_id(), old_status, new_status);
            for listener in &self.ctx.job_status_listeners {
                listener.job_status_changes(self.ctx.job_information.job_id().clone(), new_status, timestamp);
            }
        }
    }

    // ------------------------------------------------------------------
    // main thread
    // ------------------------------------------------------------------

    /// Runs every action that is ready now. A panicking action is a bug and goes to the fatal
    /// error handler.
    pub fn run_ready_actions(&mut self) -> usize {
        self.assert_running_in_main_thread();
        let mut executed = 0;
        while let Some(action) = self.ctx.main_thread.poll_ready() {
            executed += 1;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| action(self))) {
                let message = panic_message(payload.as_ref());
                log::error!("Unexpected error in the main thread of job {}: {}", self.ctx.job_information.job_id(), message);
                self.ctx.fatal_error_handler.on_fatal_error(message);
            }
        }
        executed
    }

    pub fn wait_for_pending_action(&self, timeout: Duration) -> bool {
        self.ctx.main_thread.wait_for_ready_action(timeout)
    }

    // ------------------------------------------------------------------
    // scheduling
    // ------------------------------------------------------------------

    pub fn start_scheduling(&mut self) {
        self.assert_running_in_main_thread();
        if !matches!(self.state, State::Created(_)) {
            panic!("Can only start scheduling when being in Created state, but the scheduler is in {}.", self.state.kind());
        }
        log::info!("Starting scheduling of job {} ({}).", self.ctx.job_information.name(), self.ctx.job_information.job_id());
        self.schedule_idle_slot_check();
        self.ctx.go_to_waiting_for_resources(None);
        self.apply_pending_transitions();
    }

    fn schedule_idle_slot_check(&self) {
        self.ctx.main_thread.schedule(Box::new(|scheduler| scheduler.check_idle_slot_timeout()), self.ctx.settings.slot_idle_timeout);
    }

    /// Releases idle slots and reschedules itself until the job is terminal.
    pub fn check_idle_slot_timeout(&mut self) {
        self.assert_running_in_main_thread();
        let status = self.state.job_status();
        if status.is_globally_terminal_state() {
            for slot in self.ctx.slot_pool.get_all_slots_information() {
                self.ctx.slot_pool.release_slot(&slot.allocation_id, "The job reached a globally terminal state.");
            }
            return;
        }
        if status.is_terminal_state() {
            return;
        }
        let now = self.ctx.now();
        self.ctx.slot_pool.release_idle_slots(now);
        self.schedule_idle_slot_check();
    }

    pub fn offer_slots(&mut self, offers: Vec<SlotOffer>, task_manager: TaskManagerLocation) -> Vec<AllocationId> {
        self.assert_running_in_main_thread();
        let now = self.ctx.now();
        self.ctx.slot_pool.offer_slots(offers, task_manager, now)
    }

    fn on_new_resources_available(&mut self) {
        if let Some(listener) = self.state.as_resource_listener() {
            listener.on_new_resources_available(&mut self.ctx);
        }
        self.apply_pending_transitions();
    }

    fn on_completed_checkpoint(&mut self) {
        if let Some(receiver) = self.state.as_checkpoint_stats_receiver() {
            receiver.on_completed_checkpoint(&mut self.ctx);
        }
        self.apply_pending_transitions();
    }

    fn on_failed_checkpoint(&mut self) {
        if let Some(receiver) = self.state.as_checkpoint_stats_receiver() {
            receiver.on_failed_checkpoint(&mut self.ctx);
        }
        self.apply_pending_transitions();
    }

    // ------------------------------------------------------------------
    // job control
    // ------------------------------------------------------------------

    pub fn cancel(&mut self) {
        self.assert_running_in_main_thread();
        log::info!("Canceling job {}.", self.ctx.job_information.job_id());
        self.state.cancel(&mut self.ctx);
        self.apply_pending_transitions();
    }

    /// Returns `false` if the current state does not know the reporting task.
    pub fn update_task_execution_state(&mut self, transition: TaskExecutionStateTransition) -> bool {
        self.assert_running_in_main_thread();
        let updated = match self.state.as_execution_graph_state() {
            Some(state) => state.update_task_execution_state(transition, &mut self.ctx),
            None => {
                log::debug!("Ignoring status {} of {}, there is no execution graph.", transition.execution_state, transition.attempt_id);
                false
            }
        };
        self.apply_pending_transitions();
        updated
    }

    pub fn handle_global_failure(&mut self, cause: FailureCause) {
        self.assert_running_in_main_thread();
        let labels = self.ctx.label_failure(&cause, FailureType::Global);
        self.state.handle_global_failure(cause, labels, &mut self.ctx);
        self.apply_pending_transitions();
    }

    pub fn how_to_handle_failure(&mut self, cause: &FailureCause, labels: FailureLabels) -> FailureResult {
        self.assert_running_in_main_thread();
        self.ctx.how_to_handle_failure(cause, labels)
    }

    // ------------------------------------------------------------------
    // checkpoints
    // ------------------------------------------------------------------

    fn not_executing<T: Send + 'static>(&self) -> OperationFuture<T> {
        failed_future(Error::Checkpoint(CheckpointException::with_detail(
            format!("The job is not executing, the scheduler is in state {}.", self.state.kind()),
            CheckpointFailureReason::TriggerCheckpointFailure,
        )))
    }

    pub fn trigger_checkpoint(&mut self, checkpoint_type: CheckpointType) -> OperationFuture<CompletedCheckpoint> {
        self.assert_running_in_main_thread();
        match &mut self.state {
            State::Executing(executing) => executing.trigger_checkpoint(checkpoint_type),
            _ => self.not_executing(),
        }
    }

    pub fn trigger_savepoint(&mut self, target_directory: Option<String>, cancel_job: bool, format: SavepointFormatType) -> OperationFuture<String> {
        self.assert_running_in_main_thread();
        match &mut self.state {
            State::Executing(executing) => executing.trigger_savepoint(target_directory, cancel_job, format),
            _ => self.not_executing(),
        }
    }

    pub fn stop_with_savepoint(&mut self, target_directory: Option<String>, terminate: bool, format: SavepointFormatType) -> OperationFuture<String> {
        self.assert_running_in_main_thread();
        let result = match &mut self.state {
            State::Executing(executing) => executing.stop_with_savepoint(target_directory, terminate, format, &mut self.ctx),
            _ => self.not_executing(),
        };
        self.apply_pending_transitions();
        result
    }

    pub fn acknowledge_checkpoint(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64) {
        self.assert_running_in_main_thread();
        match self.state.as_execution_graph_state() {
            Some(state) => state.acknowledge_checkpoint(attempt, checkpoint_id, &mut self.ctx),
            None => log::debug!("Ignoring acknowledgement of checkpoint {} by {}, there is no execution graph.", checkpoint_id, attempt),
        }
        self.apply_pending_transitions();
    }

    pub fn decline_checkpoint(&mut self, attempt: &ExecutionAttemptId, checkpoint_id: u64, reason: &str) {
        self.assert_running_in_main_thread();
        match self.state.as_execution_graph_state() {
            Some(state) => state.decline_checkpoint(attempt, checkpoint_id, reason, &mut self.ctx),
            None => log::debug!("Ignoring decline of checkpoint {} by {}, there is no execution graph.", checkpoint_id, attempt),
        }
        self.apply_pending_transitions();
    }

    // ------------------------------------------------------------------
    // operator coordinators
    // ------------------------------------------------------------------

    pub fn deliver_operator_event_to_coordinator(&mut self, sender: &ExecutionAttemptId, operator_id: &OperatorId, event: OperatorEvent) -> Result<()> {
        self.assert_running_in_main_thread();
        match self.state.as_execution_graph_state() {
            Some(state) => state.deliver_operator_event_to_coordinator(sender, operator_id, event),
            None => Err(Error::TaskNotRunning(format!("Task {} is not running, the job has no execution graph.", sender))),
        }
    }

    pub fn deliver_coordination_request_to_coordinator(
        &mut self,
        operator_id: &OperatorId,
        request: CoordinationRequest,
    ) -> OperationFuture<CoordinationResponse> {
        self.assert_running_in_main_thread();
        match self.state.as_execution_graph_state() {
            Some(state) => state.deliver_coordination_request_to_coordinator(operator_id, request),
            None => failed_future(Error::CoordinatorNotExist(operator_id.clone())),
        }
    }

    // ------------------------------------------------------------------
    // resource requirements
    // ------------------------------------------------------------------

    pub fn request_job_resource_requirements(&self) -> JobResourceRequirements {
        self.assert_running_in_main_thread();
        self.ctx
            .job_information
            .parallelism_store()
            .iter()
            .fold(JobResourceRequirements::empty(), |requirements, (vertex, info)| {
                requirements.with_vertex(vertex.clone(), info.min_parallelism(), info.parallelism())
            })
    }

    /// Changes the parallelism bounds of the job. Not available in reactive mode.
    pub fn update_job_resource_requirements(&mut self, requirements: JobResourceRequirements) -> Result<()> {
        self.assert_running_in_main_thread();
        if self.ctx.settings.is_reactive() {
            return Err(Error::UnsupportedOperation("Cannot change the parallelism of a job running in reactive mode.".to_string()));
        }
        requirements.validate(self.ctx.job_information.parallelism_store())?;

        let Some(store) = self.ctx.job_information.parallelism_store().apply_job_resource_requirements(&requirements) else {
            log::debug!("Resource requirements of job {} are unchanged.", self.ctx.job_information.job_id());
            return Ok(());
        };

        log::info!("Updating the resource requirements of job {}.", self.ctx.job_information.job_id());
        self.ctx.job_information = JobGraphJobInformation::new(self.ctx.job_information.copy_job_graph(), store);
        self.ctx.declare_desired_resources();
        if let Some(listener) = self.state.as_resource_listener() {
            listener.on_new_resource_requirements(&mut self.ctx);
        }
        self.apply_pending_transitions();
        Ok(())
    }

    // ------------------------------------------------------------------
    // introspection
    // ------------------------------------------------------------------

    pub fn request_job(&self) -> ExecutionGraphInfo {
        self.assert_running_in_main_thread();
        ExecutionGraphInfo::new(self.state.archived_execution_graph(&self.ctx), self.ctx.exception_history.to_vec())
    }

    pub fn request_job_status(&self) -> JobStatus {
        self.assert_running_in_main_thread();
        self.state.job_status()
    }

    pub fn request_checkpoint_stats(&self) -> CheckpointStatsSnapshot {
        self.assert_running_in_main_thread();
        self.ctx.checkpoint_services.checkpoint_stats_tracker.create_snapshot()
    }

    /// Current attempts of every subtask, empty without an execution graph.
    pub fn current_execution_attempts(&self) -> Vec<ExecutionAttemptId> {
        self.assert_running_in_main_thread();
        self.state
            .execution_graph_holder()
            .map(|holder| holder.graph.execution_vertices().map(|vertex| vertex.current_execution.attempt_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_desired_resources(&self) -> bool {
        self.ctx.has_desired_resources()
    }

    pub fn has_sufficient_resources(&self) -> bool {
        self.ctx.has_sufficient_resources()
    }

    pub fn num_restarts(&self) -> u64 {
        self.ctx.num_restarts
    }

    pub fn num_rescales(&self) -> u64 {
        self.ctx.num_rescales
    }

    pub fn job_metric_gauges() -> Vec<(&'static str, JobMetricGauge)> {
        let num_restarts: JobMetricGauge = AdaptiveScheduler::num_restarts;
        let num_rescales: JobMetricGauge = AdaptiveScheduler::num_rescales;
        vec![("numRestarts", num_restarts), ("numRescales", num_rescales)]
    }

    pub fn register_job_status_listener(&mut self, listener: Arc<dyn JobStatusListener>) {
        self.assert_running_in_main_thread();
        self.ctx.job_status_listeners.push(listener);
    }

    // ------------------------------------------------------------------
    // termination
    // ------------------------------------------------------------------

    pub fn job_termination_future(&self) -> JobTerminationFuture {
        self.ctx.job_termination_future()
    }

    /// Suspends the job and shuts the checkpoint services down once the background task terminated.
    ///
    /// The returned future completes after the shutdown ran on the main thread.
    pub fn close_async(&mut self) -> BoxFuture<'static, ()> {
        self.assert_running_in_main_thread();
        self.state.suspend(failure_cause_from_message("The scheduler is closing."), &mut self.ctx);
        self.apply_pending_transitions();

        let State::Finished(finished) = &self.state else {
            panic!("The scheduler must be Finished after suspending, but is in {}.", self.state.kind());
        };
        let status = finished.job_status();

        self.ctx.background_task.abort();
        let background_termination = self.ctx.background_task.termination_future();
        let main_thread = self.ctx.main_thread.clone();
        let (closed, on_closed) = oneshot::channel();

        self.ctx.io_executor.spawn(async move {
            background_termination.await;
            main_thread.execute(Box::new(move |scheduler| {
                log::info!("Shutting down the checkpoint services of job {} with status {}.", scheduler.ctx.job_information.job_id(), status);
                scheduler.ctx.checkpoint_services.shutdown(status);
                // The caller may have dropped the close future.
                let _ = closed.send(());
            }));
        });

        on_closed.map(|_| ()).boxed()
    }
}

impl std::fmt::Debug for AdaptiveScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveScheduler").field("state", &self.state.kind()).field("ctx", &self.ctx).finish()
    }
}

/// Forwards checkpoint statistics to the main thread.
struct MainThreadCheckpointStatsListener {
    main_thread: MainThreadExecutor,
}

impl CheckpointStatsListener for MainThreadCheckpointStatsListener {
    fn on_completed_checkpoint(&self) {
        self.main_thread.execute(Box::new(|scheduler| scheduler.on_completed_checkpoint()));
    }

    fn on_failed_checkpoint(&self) {
        self.main_thread.execute(Box::new(|scheduler| scheduler.on_failed_checkpoint()));
    }
}

/// Assembles an [`AdaptiveScheduler`]. Collaborators that are not set get in-memory defaults.
pub struct AdaptiveSchedulerBuilder {
    job_graph: JobGraph,
    io_executor: Handle,
    settings: Option<Settings>,
    clock: SharedClock,
    slot_pool: Option<Box<dyn DeclarativeSlotPool>>,
    slot_allocator: Option<Box<dyn SlotAllocator>>,
    restart_strategy_options: Option<RestartStrategyOptions>,
    execution_graph_factory: Option<Arc<dyn ExecutionGraphFactory>>,
    checkpoint_services: Option<CheckpointServices>,
    failure_enrichers: Vec<Arc<dyn FailureEnricher>>,
    job_status_listeners: Vec<Arc<dyn JobStatusListener>>,
    fatal_error_handler: Arc<dyn FatalErrorHandler>,
}

impl AdaptiveSchedulerBuilder {
    pub fn new(job_graph: JobGraph, io_executor: Handle) -> Self {
        AdaptiveSchedulerBuilder {
            job_graph,
            io_executor,
            settings: None,
            clock: SystemClock::shared(),
            slot_pool: None,
            slot_allocator: None,
            restart_strategy_options: None,
            execution_graph_factory: None,
            checkpoint_services: None,
            failure_enrichers: Vec::new(),
            job_status_listeners: Vec::new(),
            fatal_error_handler: Arc::new(ExitingFatalErrorHandler),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn slot_pool(mut self, slot_pool: Box<dyn DeclarativeSlotPool>) -> Self {
        self.slot_pool = Some(slot_pool);
        self
    }

    pub fn slot_allocator(mut self, slot_allocator: Box<dyn SlotAllocator>) -> Self {
        self.slot_allocator = Some(slot_allocator);
        self
    }

    pub fn restart_strategy(mut self, options: RestartStrategyOptions) -> Self {
        self.restart_strategy_options = Some(options);
        self
    }

    pub fn execution_graph_factory(mut self, factory: Arc<dyn ExecutionGraphFactory>) -> Self {
        self.execution_graph_factory = Some(factory);
        self
    }

    pub fn checkpoint_services(mut self, services: CheckpointServices) -> Self {
        self.checkpoint_services = Some(services);
        self
    }

    pub fn failure_enricher(mut self, enricher: Arc<dyn FailureEnricher>) -> Self {
        self.failure_enrichers.push(enricher);
        self
    }

    pub fn job_status_listener(mut self, listener: Arc<dyn JobStatusListener>) -> Self {
        self.job_status_listeners.push(listener);
        self
    }

    pub fn fatal_error_handler(mut self, handler: Arc<dyn FatalErrorHandler>) -> Self {
        self.fatal_error_handler = handler;
        self
    }

    /// Validates the job graph and builds the scheduler. The calling thread becomes its main thread.
    pub fn build(self) -> Result<AdaptiveScheduler> {
        let job_graph = self.job_graph;
        assert_preconditions(&job_graph)?;

        let settings = self.settings.unwrap_or_else(|| Settings::for_job(SchedulerExecutionMode::Default, &job_graph));
        settings.validate()?;

        let parallelism_store = initial_parallelism_store(&job_graph, &settings);
        let restart_options = self.restart_strategy_options.unwrap_or_else(|| RestartStrategyOptions::default_for(job_graph.is_checkpointing_enabled()));
        let restart_strategy = restart_options.strategy.get_instance(&restart_options, self.clock.clone());
        let checkpoint_services = self.checkpoint_services.unwrap_or_else(|| {
            let retained = job_graph.checkpointing.as_ref().map(|checkpointing| checkpointing.max_retained_checkpoints).unwrap_or(1);
            CheckpointServices::standalone(retained)
        });
        let execution_graph_factory = self
            .execution_graph_factory
            .unwrap_or_else(|| Arc::new(DefaultExecutionGraphFactory::new(self.clock.clone())));
        let mut slot_pool = self.slot_pool.unwrap_or_else(|| Box::new(DefaultDeclarativeSlotPool::new(settings.slot_idle_timeout)));
        let slot_allocator = self.slot_allocator.unwrap_or_else(|| Box::new(SlotSharingSlotAllocator::default()));

        let main_thread = MainThreadExecutor::new(self.clock.clone());
        let new_slots_thread = main_thread.clone();
        slot_pool.register_new_slots_listener(Box::new(move |slots| {
            if !slots.is_empty() {
                new_slots_thread.execute(Box::new(|scheduler| scheduler.on_new_resources_available()));
            }
        }));
        checkpoint_services
            .checkpoint_stats_tracker
            .set_listener(Arc::new(MainThreadCheckpointStatsListener { main_thread: main_thread.clone() }));

        log::info!(
            "Creating adaptive scheduler for job {} ({}) in {:?} mode.",
            job_graph.name,
            job_graph.job_id,
            settings.execution_mode
        );

        let mut ctx = SchedulerContext::new(
            JobGraphJobInformation::new(job_graph, parallelism_store),
            settings,
            slot_pool,
            slot_allocator,
            restart_strategy,
            execution_graph_factory,
            checkpoint_services,
            self.failure_enrichers,
            self.job_status_listeners,
            main_thread,
            self.io_executor,
            self.fatal_error_handler,
        );
        ctx.declare_desired_resources();

        Ok(AdaptiveScheduler { state: State::Created(Created::new()), ctx, main_thread_id: thread::current().id() })
    }
}

fn assert_preconditions(job_graph: &JobGraph) -> Result<()> {
    if job_graph.job_type != JobType::Streaming {
        return Err(Error::InvalidJobGraph(format!(
            "The adaptive scheduler only supports streaming jobs, job {} is of type {:?}.",
            job_graph.job_id, job_graph.job_type
        )));
    }
    for vertex in job_graph.vertices() {
        if vertex.parallelism == 0 {
            return Err(Error::InvalidJobGraph(format!("Vertex {} ({}) has no parallelism configured.", vertex.name, vertex.id)));
        }
        if let Some(edge) = vertex.inputs.iter().find(|edge| !edge.result_type.is_pipelined()) {
            return Err(Error::InvalidJobGraph(format!(
                "The adaptive scheduler only supports pipelined data exchanges, but the input {} of vertex {} is {:?}.",
                edge.source, vertex.name, edge.result_type
            )));
        }
    }
    Ok(())
}

fn initial_parallelism_store(job_graph: &JobGraph, settings: &Settings) -> VertexParallelismStore {
    if settings.is_reactive() {
        compute_reactive_mode_vertex_parallelism_store(job_graph.vertices(), default_max_parallelism_of, true)
    } else {
        compute_vertex_parallelism_store(job_graph.vertices(), default_max_parallelism_of)
    }
}
