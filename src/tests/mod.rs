//! Test modules for the relay queue family
//!
//! Suites are organized by functional area; unit tests for a single
//! component live next to that component's code.

use std::sync::Once;
use std::time::Duration;

mod core_functionality;

static LOGGING: Once = Once::new();

/// Install a test logger once per process so dropped-fault warnings are
/// visible when a suite runs with `--nocapture`.
pub(crate) fn init_test_logging() {
    LOGGING.call_once(|| {
        if let Ok(logger) = flexi_logger::Logger::try_with_str("warn") {
            let _ = logger.start();
        }
    });
}

/// Poll a condition until it holds or the deadline elapses.
pub(crate) async fn wait_until(condition: impl Fn() -> bool, deadline: Duration) -> bool {
    let started = tokio::time::Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
