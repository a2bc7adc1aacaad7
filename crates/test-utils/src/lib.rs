//! Shared helpers for stepdag's integration tests.

pub mod builders;
pub mod fake_executor;
pub mod fake_runner;

pub use builders::{ConfigFileBuilder, ProcessBuilder, StepBuilder, StepConfigBuilder};
pub use fake_executor::FakeExecutor;
pub use fake_runner::FakeCommandRunner;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per test binary.
///
/// Output goes through the test writer, so it only shows up for failing
/// tests (or with `--nocapture`). Filtered by `STEPDAG_LOG`, default `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_env(stepdag::logging::LOG_ENV)
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `fut`, panicking if a run hangs for more than five seconds.
pub async fn with_timeout<F, T>(fut: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(Duration::from_secs(5), fut).await {
        Ok(value) => value,
        Err(_) => panic!("run did not finish within 5 seconds"),
    }
}
