use std::any::Any;

/// Receives errors the scheduler cannot recover from.
pub trait FatalErrorHandler: Send + Sync {
    fn on_fatal_error(&self, error: String);
}

/// Logs the error and terminates the process.
#[derive(Debug, Default)]
pub struct ExitingFatalErrorHandler;

pub const FATAL_ERROR_EXIT_CODE: i32 = -17;

impl FatalErrorHandler for ExitingFatalErrorHandler {
    fn on_fatal_error(&self, error: String) {
        log::error!("Fatal error in the scheduler main thread, terminating the process: {}", error);
        std::process::exit(FATAL_ERROR_EXIT_CODE);
    }
}

/// Extracts the message of a caught panic.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
