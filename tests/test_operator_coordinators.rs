mod common;

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::json;

use adaptive_scheduler::domain::execution::execution_state::ExecutionState;
use adaptive_scheduler::domain::execution::operator_coordinator::{
    CoordinationRequest, CoordinationResponse, OperatorCoordinator, OperatorCoordinatorProvider, OperatorEvent,
};
use adaptive_scheduler::domain::failure::error_classification::failure_cause_from_message;
use adaptive_scheduler::domain::job::job_graph::{JobGraph, JobVertex};
use adaptive_scheduler::domain::job::job_status::JobStatus;
use adaptive_scheduler::domain::scheduler::job_status_listener::JobStatusStore;
use adaptive_scheduler::domain::scheduler::states::StateKind;
use adaptive_scheduler::domain::utils::id::OperatorId;
use adaptive_scheduler::domain::utils::operation_future::{OperationFuture, completed_future};
use adaptive_scheduler::error::Error;

use common::build;

/// What the coordinators of a test job saw, across all execution graphs.
#[derive(Debug, Default)]
struct CoordinatorLog {
    started: usize,
    closed: usize,
    restored: Vec<Option<u64>>,
    events: Vec<(u32, u32, OperatorEvent)>,
}

struct RecordingCoordinator {
    parallelism: u32,
    log: Arc<Mutex<CoordinatorLog>>,
}

impl OperatorCoordinator for RecordingCoordinator {
    fn start(&mut self) -> anyhow::Result<()> {
        self.log.lock().expect("Mutex poisoned").started += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().expect("Mutex poisoned").closed += 1;
    }

    fn handle_event_from_operator(&mut self, subtask: u32, attempt_number: u32, event: OperatorEvent) -> anyhow::Result<()> {
        if event.get("poison").is_some() {
            anyhow::bail!("cannot handle {}", event);
        }
        self.log.lock().expect("Mutex poisoned").events.push((subtask, attempt_number, event));
        Ok(())
    }

    fn handle_coordination_request(&mut self, request: CoordinationRequest) -> OperationFuture<CoordinationResponse> {
        completed_future(json!({ "echo": request, "parallelism": self.parallelism }))
    }

    fn reset_to_checkpoint(&mut self, checkpoint_id: Option<u64>) {
        self.log.lock().expect("Mutex poisoned").restored.push(checkpoint_id);
    }
}

fn coordinated_job(log: Arc<Mutex<CoordinatorLog>>) -> (JobGraph, OperatorId) {
    let operator_id = OperatorId::new("enumerator");
    let provider = OperatorCoordinatorProvider::new(operator_id.clone(), move |context| {
        Box::new(RecordingCoordinator { parallelism: context.parallelism, log: log.clone() }) as Box<dyn OperatorCoordinator>
    });
    let mut job_graph = JobGraph::new("coordinated");
    job_graph.add_vertex(JobVertex::new("source", 2).with_operator_coordinator(provider));
    (job_graph, operator_id)
}

#[test]
fn test_events_of_running_tasks_reach_the_coordinator() {
    let log = Arc::new(Mutex::new(CoordinatorLog::default()));
    let (job_graph, operator_id) = coordinated_job(log.clone());
    let mut test = build(job_graph, |builder| builder);
    test.start_and_run(2);

    let sender = test.scheduler.current_execution_attempts()[1].clone();
    test.scheduler.deliver_operator_event_to_coordinator(&sender, &operator_id, json!({ "split": 7 })).unwrap();

    let log = log.lock().expect("Mutex poisoned");
    assert_eq!(log.started, 1);
    assert_eq!(log.restored, vec![None]);
    assert_eq!(log.events, vec![(sender.execution_vertex_id.subtask_index, 0, json!({ "split": 7 }))]);
}

#[test]
fn test_coordination_requests_are_answered() {
    let log = Arc::new(Mutex::new(CoordinatorLog::default()));
    let (job_graph, operator_id) = coordinated_job(log);
    let mut test = build(job_graph, |builder| builder);
    test.start_and_run(2);

    let response = test.scheduler.deliver_coordination_request_to_coordinator(&operator_id, json!("progress")).now_or_never().unwrap().unwrap();

    assert_eq!(response, json!({ "echo": "progress", "parallelism": 2 }));
}

#[test]
fn test_unknown_operators_are_rejected() {
    let log = Arc::new(Mutex::new(CoordinatorLog::default()));
    let (job_graph, _) = coordinated_job(log);
    let mut test = build(job_graph, |builder| builder);
    test.start_and_run(2);

    let unknown = OperatorId::new("missing");
    let sender = test.scheduler.current_execution_attempts()[0].clone();
    let event = test.scheduler.deliver_operator_event_to_coordinator(&sender, &unknown, json!({}));
    assert!(matches!(event, Err(Error::CoordinatorNotExist(_))));

    let request = test.scheduler.deliver_coordination_request_to_coordinator(&unknown, json!({})).now_or_never().unwrap();
    assert!(matches!(request, Err(Error::CoordinatorNotExist(_))));
}

#[test]
fn test_events_of_tasks_that_are_not_running_are_rejected() {
    let log = Arc::new(Mutex::new(CoordinatorLog::default()));
    let (job_graph, operator_id) = coordinated_job(log.clone());
    let mut test = build(job_graph, |builder| builder);
    test.scheduler.start_scheduling();
    test.offer_slots(2);
    test.drive_until_state(StateKind::Executing);

    // Deployed, but not reported as running yet.
    let sender = test.scheduler.current_execution_attempts()[0].clone();
    let result = test.scheduler.deliver_operator_event_to_coordinator(&sender, &operator_id, json!({ "split": 1 }));

    assert!(matches!(result, Err(Error::TaskNotRunning(_))));
    assert!(log.lock().expect("Mutex poisoned").events.is_empty());
}

#[test]
fn test_failing_coordinator_reports_the_error() {
    let log = Arc::new(Mutex::new(CoordinatorLog::default()));
    let (job_graph, operator_id) = coordinated_job(log);
    let mut test = build(job_graph, |builder| builder);
    test.start_and_run(2);

    let sender = test.scheduler.current_execution_attempts()[0].clone();
    let result = test.scheduler.deliver_operator_event_to_coordinator(&sender, &operator_id, json!({ "poison": true }));

    assert!(matches!(result, Err(Error::OperationFailed(message)) if message.contains("cannot handle")));
    assert_eq!(test.scheduler.request_job_status(), JobStatus::Running);
}

#[test]
fn test_restart_replaces_the_coordinators() {
    let log = Arc::new(Mutex::new(CoordinatorLog::default()));
    let (job_graph, _) = coordinated_job(log.clone());
    let mut test = build(job_graph, |builder| builder);
    let late_listener = Arc::new(JobStatusStore::new());
    test.scheduler.register_job_status_listener(late_listener.clone());
    test.start_and_run(2);

    test.scheduler.handle_global_failure(failure_cause_from_message("coordinator lost its lease"));
    assert_eq!(test.scheduler.state_kind(), StateKind::Restarting);
    assert_eq!(log.lock().expect("Mutex poisoned").closed, 0);

    test.report_all(ExecutionState::Canceled);
    test.drive_until_state(StateKind::Executing);

    {
        let log = log.lock().expect("Mutex poisoned");
        assert_eq!(log.started, 2);
        assert_eq!(log.closed, 1);
    }
    assert_eq!(late_listener.latest_status(), Some(JobStatus::Running));
    assert!(late_listener.status_timestamp(JobStatus::Restarting).is_some());

    test.scheduler.cancel();
    test.report_all(ExecutionState::Canceled);
    assert_eq!(test.scheduler.request_job_status(), JobStatus::Canceled);
    assert_eq!(log.lock().expect("Mutex poisoned").closed, 2);
}
