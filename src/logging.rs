//! # Logging
//!
//! `log` facade for the engine, backed by `env_logger` in the CLI. Dongle
//! traffic is logged at debug level (`Send request ...`, `Queuing for ...`).
//! Per client traffic captures go to [`crate::rfp::monitor`] files instead.
//!
//! The `log_*` helpers take preformatted messages so call sites can build
//! them with the client id and port in front.

use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes the logger with the `env_logger` crate.
///
/// Verbosity follows `RUST_LOG`; the default shows warnings and errors.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .try_init();
}

/// Initializes the logger for tests, ignoring repeated initialisation.
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Logs an error message, such as a lost session.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message, such as an unanswered request.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message; raw traffic lands here.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}
