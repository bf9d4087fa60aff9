pub mod adaptive_scheduler;
pub mod background_task;
pub mod context;
pub mod fatal_error_handler;
pub mod job_status_listener;
pub mod main_thread;
pub mod scheduler_handle;
pub mod settings;
pub mod state_transition_manager;
pub mod states;
