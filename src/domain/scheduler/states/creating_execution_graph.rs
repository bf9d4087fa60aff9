use std::time::Duration;

use crate::domain::allocator::slot_allocator::JobSchedulingPlan;
use crate::domain::execution::archived_execution_graph::ArchivedExecutionGraph;
use crate::domain::execution::execution_graph::ExecutionGraph;
use crate::domain::execution::execution_graph_factory::ExecutionGraphCreationRequest;
use crate::domain::execution::operator_coordinator::OperatorCoordinatorHandler;
use crate::domain::failure::error_classification::{failure_cause, failure_cause_from_message};
use crate::domain::job::job_status::JobStatus;
use crate::domain::job::vertex_parallelism::VertexParallelismStore;
use crate::domain::scheduler::context::SchedulerContext;
use crate::domain::scheduler::states::state_with_execution_graph::ExecutionGraphHolder;
use crate::domain::scheduler::states::{State, StateKind, sparse_archived_execution_graph};
use crate::error::{Error, Result};

/// Builds the execution graph for the parallelism the free slots allow.
///
/// The plan is computed on the main thread, the graph is built by a background task on the I/O
/// executor. Results of a superseded background task are dropped.
#[derive(Debug)]
pub struct CreatingExecutionGraph {
    plan: Option<JobSchedulingPlan>,
    background_task_generation: u64,
    previous_execution_graph: Option<ArchivedExecutionGraph>,
}

impl CreatingExecutionGraph {
    pub fn new(previous_execution_graph: Option<ArchivedExecutionGraph>, ctx: &mut SchedulerContext) -> Self {
        let free_slots = ctx.slot_pool.get_free_slot_tracker();
        let plan = ctx
            .slot_allocator
            .determine_parallelism_and_calculate_assignment(&ctx.job_information, &free_slots, &ctx.previous_allocations);

        let Some(plan) = plan else {
            log::info!("Not enough resources to schedule job {}, waiting for more.", ctx.job_information.job_id());
            ctx.run_if_state::<CreatingExecutionGraph, _>(Duration::ZERO, |creating, ctx| {
                ctx.go_to_waiting_for_resources(creating.previous_execution_graph.take());
            });
            return CreatingExecutionGraph { plan: None, background_task_generation: ctx.background_task.generation(), previous_execution_graph };
        };

        let request = ExecutionGraphCreationRequest {
            job_information: ctx.job_information.clone(),
            parallelism_store: adjusted_parallelism_store(ctx.job_information.parallelism_store(), &ctx.initial_parallelism_store, &plan),
            attempt_numbers: ctx.attempt_numbers.clone(),
            checkpoint_services: ctx.checkpoint_services.clone(),
        };

        let factory = ctx.execution_graph_factory.clone();
        let main_thread = ctx.main_thread.clone();
        let epoch = ctx.state_epoch;
        let generation = ctx.background_task.generation() + 1;

        ctx.background_task = ctx.background_task.run_after(
            async move { factory.create_and_restore_execution_graph(request).await },
            &ctx.io_executor,
            move |result| {
                main_thread.execute(Box::new(move |scheduler| {
                    scheduler.run_state_action(
                        epoch,
                        Box::new(move |state, ctx| {
                            if let State::CreatingExecutionGraph(creating) = state {
                                creating.on_execution_graph_created(generation, result, ctx);
                            }
                        }),
                    );
                }));
            },
        );

        CreatingExecutionGraph { plan: Some(plan), background_task_generation: generation, previous_execution_graph }
    }

    pub fn on_leave(&mut self, target: StateKind, ctx: &mut SchedulerContext) {
        if target != StateKind::Executing {
            ctx.background_task.abort();
        }
    }

    fn on_execution_graph_created(&mut self, generation: u64, result: Result<ExecutionGraph>, ctx: &mut SchedulerContext) {
        if generation != self.background_task_generation || ctx.background_task.is_aborted() {
            log::debug!("Ignoring the execution graph of superseded background task {}.", generation);
            return;
        }

        match result {
            Ok(graph) => self.install(graph, ctx),
            Err(Error::NoResourceAvailable(reason)) => {
                log::info!("No resources available for job {}: {}", ctx.job_information.job_id(), reason);
                ctx.go_to_waiting_for_resources(self.previous_execution_graph.take());
            }
            Err(e) => {
                log::error!("Failed to create the execution graph of job {}: {}", ctx.job_information.job_id(), e);
                let cause = failure_cause(e);
                ctx.go_to_finished(sparse_archived_execution_graph(JobStatus::Failed, Some(&cause), ctx));
            }
        }
    }

    fn install(&mut self, mut graph: ExecutionGraph, ctx: &mut SchedulerContext) {
        let Some(plan) = self.plan.as_ref() else {
            return;
        };

        let now = ctx.now();
        let Some(reserved_slots) = ctx.slot_allocator.try_reserve_resources(plan, ctx.slot_pool.as_mut(), now) else {
            log::info!("The slots planned for job {} are gone, waiting for resources again.", ctx.job_information.job_id());
            ctx.go_to_waiting_for_resources(self.previous_execution_graph.take());
            return;
        };

        graph.transition_to_running();
        if let Err(e) = graph.assign_slots(&reserved_slots) {
            log::warn!("Could not assign the reserved slots of job {}: {}", ctx.job_information.job_id(), e);
            ctx.free_slots(graph.assigned_allocations());
            ctx.go_to_waiting_for_resources(self.previous_execution_graph.take());
            return;
        }

        let mut operator_coordinator_handler = OperatorCoordinatorHandler::new(ctx.job_information.job_graph(), &graph);
        let restored_checkpoint_id = graph.restored_checkpoint().map(|checkpoint| checkpoint.checkpoint_id);
        if let Err(e) = operator_coordinator_handler.start_all_operator_coordinators(restored_checkpoint_id) {
            log::error!("Failed to start the operator coordinators of job {}: {:#}", ctx.job_information.job_id(), e);
            operator_coordinator_handler.dispose_all_operator_coordinators();
            let cause = failure_cause_from_message(format!("{:#}", e));
            graph.fail_job(&cause, now);
            ctx.free_slots(graph.assigned_allocations());
            let archived = ArchivedExecutionGraph::from_execution_graph_with_state(
                &graph,
                JobStatus::Failed,
                Some(ctx.checkpoint_services.checkpoint_stats_tracker.create_snapshot()),
            );
            ctx.go_to_finished(archived);
            return;
        }

        ctx.go_to_executing(Some(ExecutionGraphHolder::new(graph, operator_coordinator_handler)));
    }
}

/// The current store with each vertex set to the parallelism of the plan. Max parallelism and
/// its validator come from the store computed at submission.
fn adjusted_parallelism_store(store: &VertexParallelismStore, initial: &VertexParallelismStore, plan: &JobSchedulingPlan) -> VertexParallelismStore {
    let mut adjusted = VertexParallelismStore::new();
    for (vertex, info) in store.iter() {
        let parallelism = plan.vertex_parallelism().get_parallelism(vertex).unwrap_or_else(|| info.parallelism());
        let mut adjusted_info = info.with_parallelism(parallelism);
        if let Some(baseline) = initial.get_parallelism_info(vertex) {
            adjusted_info = adjusted_info.with_max_parallelism_of(baseline);
        }
        adjusted.set_parallelism_info(vertex.clone(), adjusted_info);
    }
    adjusted
}
