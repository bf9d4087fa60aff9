pub mod canceling;
pub mod created;
pub mod creating_execution_graph;
pub mod executing;
pub mod failing;
pub mod finished;
pub mod restarting;
pub mod state_with_execution_graph;
pub mod stop_with_savepoint;
pub mod waiting_for_resources;

use std::fmt;
use std::time::Duration;

use crate::domain::allocator::slot_allocator::VertexParallelism;
use crate::domain::execution::archived_execution_graph::ArchivedExecutionGraph;
use crate::domain::failure::error_classification::FailureCause;
use crate::domain::failure::failure_enricher::FailureLabels;
use crate::domain::job::job_status::JobStatus;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::state_transition_manager::{DefaultStateTransitionManager, StateTransitionContext};

use canceling::Canceling;
use created::Created;
use creating_execution_graph::CreatingExecutionGraph;
use executing::Executing;
use failing::Failing;
use finished::Finished;
use restarting::Restarting;
use state_with_execution_graph::{ExecutionGraphHolder, StateWithExecutionGraph};
use stop_with_savepoint::StopWithSavepoint;
use waiting_for_resources::WaitingForResources;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Created,
    WaitingForResources,
    CreatingExecutionGraph,
    Executing,
    Restarting,
    Canceling,
    Failing,
    StopWithSavepoint,
    Finished,
    Transitioning,
}

impl StateKind {
    /// States that own an execution graph hand it over among each other.
    pub fn holds_execution_graph(&self) -> bool {
        matches!(
            self,
            StateKind::Executing | StateKind::Restarting | StateKind::Canceling | StateKind::Failing | StateKind::StopWithSavepoint
        )
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Builds the next state from the one that was just left.
pub type StateFactory = Box<dyn FnOnce(State, &mut SchedulerContext) -> State + Send>;

/// Action bound to one installed state.
pub type StateAction = Box<dyn FnOnce(&mut State, &mut SchedulerContext) + Send>;

/// The current state of the scheduler. Each variant owns exactly the data of that state.
#[derive(Debug)]
pub enum State {
    Created(Created),
    WaitingForResources(WaitingForResources),
    CreatingExecutionGraph(CreatingExecutionGraph),
    Executing(Executing),
    Restarting(Restarting),
    Canceling(Canceling),
    Failing(Failing),
    StopWithSavepoint(StopWithSavepoint),
    Finished(Finished),
    /// Placeholder while the next state is being built.
    Transitioning,
}

/// Reacts to slots being offered or requirements changing.
pub trait ResourceListener {
    fn on_new_resources_available(&mut self, ctx: &mut SchedulerContext);

    fn on_new_resource_requirements(&mut self, ctx: &mut SchedulerContext);
}

/// Reacts to checkpoint statistics. Used to trigger rescales.
pub trait CheckpointStatsReceiver {
    fn on_completed_checkpoint(&mut self, ctx: &mut SchedulerContext);

    fn on_failed_checkpoint(&mut self, ctx: &mut SchedulerContext);
}

/// Lets typed actions find their state again.
pub trait StateVariant: Sized + 'static {
    fn downcast(state: &mut State) -> Option<&mut Self>;
}

macro_rules! state_variant {
    ($($variant:ident),*) => {
        $(
            impl StateVariant for $variant {
                fn downcast(state: &mut State) -> Option<&mut Self> {
                    match state {
                        State::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

state_variant!(Created, WaitingForResources, CreatingExecutionGraph, Executing, Restarting, Canceling, Failing, StopWithSavepoint, Finished);

impl State {
    pub fn kind(&self) -> StateKind {
        match self {
            State::Created(_) => StateKind::Created,
            State::WaitingForResources(_) => StateKind::WaitingForResources,
            State::CreatingExecutionGraph(_) => StateKind::CreatingExecutionGraph,
            State::Executing(_) => StateKind::Executing,
            State::Restarting(_) => StateKind::Restarting,
            State::Canceling(_) => StateKind::Canceling,
            State::Failing(_) => StateKind::Failing,
            State::StopWithSavepoint(_) => StateKind::StopWithSavepoint,
            State::Finished(_) => StateKind::Finished,
            State::Transitioning => StateKind::Transitioning,
        }
    }

    pub fn job_status(&self) -> JobStatus {
        match self {
            State::Created(_) => JobStatus::Initializing,
            State::WaitingForResources(_) | State::CreatingExecutionGraph(_) => JobStatus::Created,
            State::Executing(_) | State::StopWithSavepoint(_) => JobStatus::Running,
            State::Restarting(_) => JobStatus::Restarting,
            State::Canceling(_) => JobStatus::Cancelling,
            State::Failing(_) => JobStatus::Failing,
            State::Finished(finished) => finished.job_status(),
            State::Transitioning => panic!("The job status is unknown while a state transition is in progress."),
        }
    }

    pub fn archived_execution_graph(&self, ctx: &SchedulerContext) -> ArchivedExecutionGraph {
        match self {
            State::Finished(finished) => finished.archived_execution_graph().clone(),
            State::WaitingForResources(waiting) => waiting.archived_execution_graph(ctx),
            _ => match self.execution_graph_holder() {
                Some(holder) => holder.archive(self.job_status(), ctx),
                None => sparse_archived_execution_graph(self.job_status(), None, ctx),
            },
        }
    }

    pub fn cancel(&mut self, ctx: &mut SchedulerContext) {
        match self {
            State::Created(_) | State::WaitingForResources(_) | State::CreatingExecutionGraph(_) => {
                ctx.go_to_finished(sparse_archived_execution_graph(JobStatus::Canceled, None, ctx));
            }
            State::Executing(executing) => executing.cancel(ctx),
            State::Restarting(_) | State::Failing(_) => ctx.go_to_canceling(),
            State::StopWithSavepoint(stop) => stop.cancel(ctx),
            State::Canceling(_) | State::Finished(_) | State::Transitioning => {}
        }
    }

    /// Stops the job without waiting for tasks, for example because the scheduler closes.
    pub fn suspend(&mut self, cause: FailureCause, ctx: &mut SchedulerContext) {
        match self {
            State::Created(_) | State::WaitingForResources(_) | State::CreatingExecutionGraph(_) => {
                ctx.go_to_finished(sparse_archived_execution_graph(JobStatus::Suspended, Some(&cause), ctx));
            }
            State::StopWithSavepoint(stop) => stop.suspend(cause, ctx),
            State::Finished(_) | State::Transitioning => {}
            _ => {
                if let Some(holder) = self.execution_graph_holder_mut() {
                    holder.graph.suspend(&cause);
                    let archived = holder.archive(JobStatus::Suspended, ctx);
                    ctx.go_to_finished(archived);
                }
            }
        }
    }

    pub fn handle_global_failure(&mut self, cause: FailureCause, labels: FailureLabels, ctx: &mut SchedulerContext) {
        match self {
            State::Created(_) | State::WaitingForResources(_) | State::CreatingExecutionGraph(_) => {
                log::info!("Job {} failed before it was running: {:#}", ctx.job_information.job_id(), cause);
                ctx.go_to_finished(sparse_archived_execution_graph(JobStatus::Failed, Some(&cause), ctx));
            }
            State::Finished(_) | State::Transitioning => {
                log::debug!("Ignoring global failure in a terminal state: {:#}", cause);
            }
            _ => {
                if let Some(state) = self.as_execution_graph_state() {
                    state.handle_global_failure(cause, labels, ctx);
                }
            }
        }
    }

    /// Called right before the next state is built.
    pub fn on_leave(&mut self, target: StateKind, ctx: &mut SchedulerContext) {
        match self {
            State::CreatingExecutionGraph(creating) => creating.on_leave(target, ctx),
            State::StopWithSavepoint(stop) => stop.on_leave(),
            _ => {}
        }
        if !target.holds_execution_graph() {
            if let Some(holder) = self.execution_graph_holder_mut() {
                holder.release(ctx);
            }
        }
    }

    /// Hands the execution graph to the next state. Panics for states without one.
    pub fn into_execution_graph_holder(self, target: StateKind) -> ExecutionGraphHolder {
        let kind = self.kind();
        match self {
            State::Executing(executing) => executing.into_holder(),
            State::Restarting(restarting) => restarting.into_holder(),
            State::Canceling(canceling) => canceling.into_holder(),
            State::Failing(failing) => failing.into_holder(),
            State::StopWithSavepoint(stop) => stop.into_holder(),
            _ => panic!("{} requires an execution graph, but the previous state {} has none.", target, kind),
        }
    }

    pub fn execution_graph_holder(&self) -> Option<&ExecutionGraphHolder> {
        match self {
            State::Executing(state) => Some(state.holder()),
            State::Restarting(state) => Some(state.holder()),
            State::Canceling(state) => Some(state.holder()),
            State::Failing(state) => Some(state.holder()),
            State::StopWithSavepoint(state) => Some(state.holder()),
            _ => None,
        }
    }

    pub fn execution_graph_holder_mut(&mut self) -> Option<&mut ExecutionGraphHolder> {
        self.as_execution_graph_state().map(|state| state.holder_mut())
    }

    pub fn as_execution_graph_state(&mut self) -> Option<&mut dyn StateWithExecutionGraph> {
        match self {
            State::Executing(state) => Some(state),
            State::Restarting(state) => Some(state),
            State::Canceling(state) => Some(state),
            State::Failing(state) => Some(state),
            State::StopWithSavepoint(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_resource_listener(&mut self) -> Option<&mut dyn ResourceListener> {
        match self {
            State::WaitingForResources(state) => Some(state),
            State::Executing(state) => Some(state),
            _ => None,
        }
    }

    pub fn as_checkpoint_stats_receiver(&mut self) -> Option<&mut dyn CheckpointStatsReceiver> {
        match self {
            State::Executing(state) => Some(state),
            _ => None,
        }
    }
}

/// Summary for states without an execution graph.
pub fn sparse_archived_execution_graph(status: JobStatus, failure: Option<&FailureCause>, ctx: &SchedulerContext) -> ArchivedExecutionGraph {
    let now = ctx.now();
    ArchivedExecutionGraph::create_sparse(
        ctx.job_information.job_graph(),
        status,
        failure.map(|cause| (cause, now)),
        &ctx.initial_parallelism_store,
        ctx.initialization_timestamp,
        Some(ctx.checkpoint_services.checkpoint_stats_tracker.create_snapshot()),
    )
}

/// Answers the questions of a [`DefaultStateTransitionManager`] and collects what it asked for.
///
/// With a current parallelism, resources only count if they allow a different parallelism.
pub struct TransitionDriver<'a> {
    ctx: &'a SchedulerContext,
    current_parallelism: Option<VertexParallelism>,
    pub transition_requested: bool,
    pub evaluations: Vec<Duration>,
}

impl<'a> TransitionDriver<'a> {
    pub fn new(ctx: &'a SchedulerContext, current_parallelism: Option<VertexParallelism>) -> Self {
        TransitionDriver { ctx, current_parallelism, transition_requested: false, evaluations: Vec::new() }
    }

    /// Runs `step` against `manager` and returns whether a transition is due plus the requested evaluations.
    pub fn drive(
        manager: &mut DefaultStateTransitionManager,
        ctx: &SchedulerContext,
        current_parallelism: Option<VertexParallelism>,
        step: impl FnOnce(&mut DefaultStateTransitionManager, &mut TransitionDriver<'_>),
    ) -> (bool, Vec<Duration>) {
        let mut driver = TransitionDriver::new(ctx, current_parallelism);
        step(manager, &mut driver);
        (driver.transition_requested, driver.evaluations)
    }

    fn parallelism_changed(&self) -> bool {
        let Some(current) = &self.current_parallelism else {
            return true;
        };
        match self.ctx.available_vertex_parallelism() {
            Some(available) => available.iter().any(|(vertex, parallelism)| current.get_parallelism(vertex) != Some(parallelism)),
            None => false,
        }
    }
}

impl StateTransitionContext for TransitionDriver<'_> {
    fn has_desired_resources(&self) -> bool {
        self.parallelism_changed() && self.ctx.has_desired_resources()
    }

    fn has_sufficient_resources(&self) -> bool {
        self.parallelism_changed() && self.ctx.has_sufficient_resources()
    }

    fn transition_to_subsequent_state(&mut self) {
        self.transition_requested = true;
    }

    fn schedule_evaluation(&mut self, delay: Duration) {
        self.evaluations.push(delay);
    }
}
