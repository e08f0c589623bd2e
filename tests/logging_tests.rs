//! Unit tests for the logging functionality in the `rfplayer-rs` crate.

use rfplayer_rs::logging::{init_logger, init_test_logger, log_debug, log_error, log_info, log_warn};
use rfplayer_rs::util::logging::LogThrottle;

/// Tests that the logging helpers do not panic once a logger is installed.
#[test]
fn test_logging() {
    init_test_logger();
    log_error("Error on /dev/ttyUSB0 device (disconnected ?)");
    log_warn("Unsynced data dropped");
    log_info("***** Start listening on rfp.1 *****");
    log_debug("Send request ZIA++1 STATUS JSON on rfp.1");
}

/// Tests that the logger can be initialized more than once.
#[test]
fn test_init_logger() {
    init_logger();
    init_logger();
}

/// Tests that the throttle lets a bounded number of messages through per window.
#[test]
fn test_log_throttle() {
    let mut throttle = LogThrottle::new(60_000, 3);
    let allowed = (0..10).filter(|_| throttle.allow()).count();
    assert_eq!(allowed, 3);
}
