mod common;

use std::time::Duration;

use adaptive_scheduler::domain::job::job_graph::ResultPartitionType;
use adaptive_scheduler::domain::resource::resource_profile::ResourceProfile;
use adaptive_scheduler::domain::restart::RestartStrategyType;
use adaptive_scheduler::domain::scheduler::adaptive_scheduler::AdaptiveSchedulerBuilder;
use adaptive_scheduler::domain::scheduler::scheduler_handle::SchedulerHandle;
use adaptive_scheduler::domain::scheduler::settings::SchedulerExecutionMode;
use adaptive_scheduler::domain::scheduler::states::StateKind;
use adaptive_scheduler::domain::slot_pool::slot_info::{SlotOffer, TaskManagerLocation};
use adaptive_scheduler::domain::utils::id::{JobId, JobVertexId};
use adaptive_scheduler::error::Error;
use adaptive_scheduler::{load_job_graph, load_restart_strategy, load_settings};

fn data_file(name: &str) -> String {
    format!("{}/tests/data/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_load_job_graph() {
    let job_graph = load_job_graph(&data_file("streaming_job.json")).unwrap();

    assert_eq!(job_graph.job_id, JobId::new("5f1c0e6a9b2d4c7e8a3f1b2c3d4e5f60"));
    assert_eq!(job_graph.name, "Clickstream-Sessionization");
    assert_eq!(job_graph.number_of_vertices(), 3);

    let sessionize = job_graph.vertices().iter().find(|vertex| vertex.id == JobVertexId::new("sessionize")).unwrap();
    assert_eq!(sessionize.parallelism, 4);
    assert_eq!(sessionize.max_parallelism, Some(256));

    let sink = job_graph.vertices().iter().find(|vertex| vertex.id == JobVertexId::new("sink")).unwrap();
    assert_eq!(sink.inputs.len(), 1);
    assert_eq!(sink.inputs[0].result_type, ResultPartitionType::PipelinedBounded);

    let checkpointing = job_graph.checkpointing.as_ref().unwrap();
    assert_eq!(checkpointing.checkpoint_interval, Duration::from_secs(30));
    assert_eq!(checkpointing.default_savepoint_directory.as_deref(), Some("file:///var/savepoints"));
}

#[test]
fn test_load_missing_file() {
    let result = load_job_graph(&data_file("does_not_exist.json"));
    assert!(matches!(result, Err(Error::IoError(_))));
}

#[test]
fn test_load_settings() {
    let job_graph = load_job_graph(&data_file("streaming_job.json")).unwrap();

    let settings = load_settings(Some(&data_file("reactive_settings.json")), &job_graph).unwrap();
    assert_eq!(settings.execution_mode, SchedulerExecutionMode::Reactive);
    assert_eq!(settings.submission_resource_wait_timeout, None);
    assert_eq!(settings.slot_idle_timeout, Duration::from_secs(20));
    assert_eq!(settings.executing_cooldown_timeout, Duration::from_secs(5));
    assert_eq!(settings.max_exception_history_size, 8);
    // Three checkpoint intervals, derived from the job.
    assert_eq!(settings.maximum_delay_for_triggering_rescale, Duration::from_secs(90));

    let defaults = load_settings(None, &job_graph).unwrap();
    assert_eq!(defaults.execution_mode, SchedulerExecutionMode::Default);
    assert_eq!(defaults.submission_resource_wait_timeout, Some(Duration::from_secs(300)));
}

#[test]
fn test_load_restart_strategy() {
    let options = load_restart_strategy(&data_file("restart_strategy.json")).unwrap();

    assert_eq!(options.strategy, RestartStrategyType::ExponentialDelay);
    assert_eq!(options.exponential_delay.initial_backoff, Duration::from_millis(500));
    assert_eq!(options.exponential_delay.max_backoff, Duration::from_secs(60));
}

#[test]
fn test_loaded_job_runs_on_a_scheduler_thread() {
    let job_graph = load_job_graph(&data_file("streaming_job.json")).unwrap();
    let settings = common::eager_settings(SchedulerExecutionMode::Default);
    let runtime = common::runtime();
    let io_executor = runtime.handle().clone();

    let handle = SchedulerHandle::spawn("loaded", move || AdaptiveSchedulerBuilder::new(job_graph, io_executor).settings(settings).build()).unwrap();
    handle.call(|scheduler| scheduler.start_scheduling());
    handle.call(|scheduler| {
        let offers = (0..4).map(|index| SlotOffer::new(index, ResourceProfile::Unknown)).collect();
        scheduler.offer_slots(offers, TaskManagerLocation::new("tm-1", "localhost"))
    });

    let mut state = handle.call(|scheduler| scheduler.state_kind());
    for _ in 0..200 {
        if state == StateKind::Executing {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
        state = handle.call(|scheduler| scheduler.state_kind());
    }

    assert_eq!(state, StateKind::Executing);
    // Slot sharing puts one subtask of every vertex into each slot.
    assert_eq!(handle.call(|scheduler| scheduler.current_execution_attempts().len()), 8);
}
