use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use adaptive_scheduler::domain::execution::execution_state::{ExecutionState, TaskExecutionStateTransition};
use adaptive_scheduler::domain::resource::resource_profile::ResourceProfile;
use adaptive_scheduler::domain::scheduler::adaptive_scheduler::AdaptiveSchedulerBuilder;
use adaptive_scheduler::domain::scheduler::scheduler_handle::SchedulerHandle;
use adaptive_scheduler::domain::scheduler::states::StateKind;
use adaptive_scheduler::domain::slot_pool::slot_info::{SlotOffer, TaskManagerLocation};
use adaptive_scheduler::error::Result;
use adaptive_scheduler::{load_job_graph, load_restart_strategy, load_settings, logger};

/// Runs a job graph on an in-memory slot pool and reports where the scheduler ends up.
#[derive(Parser, Debug)]
#[command(name = "adaptive-scheduler", version, about)]
struct Args {
    /// Job graph JSON file.
    job_graph: String,

    /// Scheduler settings JSON file.
    #[arg(short, long)]
    settings: Option<String>,

    /// Restart strategy JSON file.
    #[arg(short, long)]
    restart_strategy: Option<String>,

    /// Number of slots offered by the task manager.
    #[arg(long, default_value_t = 4)]
    slots: u32,

    /// How long to wait for the job to run.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

fn main() {
    logger::init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        log::error!("Scheduler demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let job_graph = load_job_graph(&args.job_graph)?;
    let settings = load_settings(args.settings.as_deref(), &job_graph)?;
    let restart_strategy = args.restart_strategy.as_deref().map(load_restart_strategy).transpose()?;
    log::info!("Loaded job '{}' with {} vertices.", job_graph.name, job_graph.number_of_vertices());

    let runtime = tokio::runtime::Builder::new_multi_thread().thread_name("scheduler-io").enable_all().build()?;
    let io_executor = runtime.handle().clone();

    let mut handle = SchedulerHandle::spawn(job_graph.name.clone(), move || {
        let mut builder = AdaptiveSchedulerBuilder::new(job_graph, io_executor).settings(settings);
        if let Some(options) = restart_strategy {
            builder = builder.restart_strategy(options);
        }
        builder.build()
    })?;

    handle.call(|scheduler| scheduler.start_scheduling());

    let offers: Vec<SlotOffer> = (0..args.slots).map(|index| SlotOffer::new(index, ResourceProfile::Unknown)).collect();
    let accepted = handle.call(move |scheduler| scheduler.offer_slots(offers, TaskManagerLocation::new("tm-1", "localhost")));
    log::info!("The slot pool accepted {} of {} slots.", accepted.len(), args.slots);

    let deadline = Instant::now() + Duration::from_secs(args.timeout_secs);
    while handle.call(|scheduler| scheduler.state_kind()) != StateKind::Executing {
        if Instant::now() >= deadline {
            log::warn!("The job did not start within {} s.", args.timeout_secs);
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let running = handle.call(|scheduler| {
        let attempts = scheduler.current_execution_attempts();
        for attempt in &attempts {
            scheduler.update_task_execution_state(TaskExecutionStateTransition::new(attempt.clone(), ExecutionState::Running));
        }
        attempts.len()
    });
    log::info!("{} tasks reported running.", running);

    let (status, state, requirements) =
        handle.call(|scheduler| (scheduler.request_job_status(), scheduler.state_kind(), scheduler.request_job_resource_requirements()));
    println!("Job status: {} (scheduler state {})", status, state);
    for (vertex, bounds) in requirements.iter() {
        println!("  {} parallelism [{}, {}]", vertex, bounds.lower_bound, bounds.upper_bound);
    }

    let closed = handle.call(|scheduler| scheduler.close_async());
    runtime.block_on(closed);
    handle.stop();
    Ok(())
}
