use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stepdag::exec::{CommandOutcome, CommandRequest, CommandRunner};
use tokio_util::sync::CancellationToken;

/// Scripted behaviour for one step.
#[derive(Debug, Clone)]
struct Script {
    /// Outcome per attempt; the last entry repeats.
    outcomes: Vec<CommandOutcome>,
    /// Simulated run time of each attempt.
    delay: Duration,
}

/// A fake `CommandRunner` that:
/// - returns scripted outcomes per step (success with the step name as
///   stdout by default)
/// - records every invocation, in order
/// - tracks how many commands were running at the same time
/// - honours the cancellation token while "running"
#[derive(Debug, Default)]
pub struct FakeCommandRunner {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<CommandRequest>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn script(self, step: &str, f: impl FnOnce(&mut Script)) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let entry = scripts.entry(step.to_string()).or_insert_with(|| Script {
                outcomes: Vec::new(),
                delay: Duration::ZERO,
            });
            f(entry);
        }
        self
    }

    /// Every attempt of `step` fails with exit code 1.
    pub fn failing(self, step: &str) -> Self {
        self.script(step, |s| {
            s.outcomes = vec![CommandOutcome::failed(Some(1), format!("{step} failed"))]
        })
    }

    /// The first `n` attempts fail, later ones succeed.
    pub fn failing_times(self, step: &str, n: usize) -> Self {
        self.script(step, |s| {
            let mut outcomes = vec![CommandOutcome::failed(Some(1), format!("{step} failed")); n];
            outcomes.push(CommandOutcome::success(step));
            s.outcomes = outcomes;
        })
    }

    /// Successful attempts of `step` print `stdout`.
    pub fn output(self, step: &str, stdout: &str) -> Self {
        let stdout = stdout.to_string();
        self.script(step, |s| s.outcomes = vec![CommandOutcome::success(stdout)])
    }

    /// Each attempt of `step` takes `delay` before reporting.
    pub fn delay(self, step: &str, delay: Duration) -> Self {
        self.script(step, |s| s.delay = delay)
    }

    /// Step names in invocation order (one entry per attempt).
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.step.clone())
            .collect()
    }

    pub fn attempts_of(&self, step: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.step == step)
            .count()
    }

    /// Environment passed to the first attempt of `step`.
    pub fn environment_of(&self, step: &str) -> Option<BTreeMap<String, String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.step == step)
            .map(|r| r.environment.clone())
    }

    /// Highest number of commands observed running at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, step: &str, attempt: usize) -> (CommandOutcome, Duration) {
        let scripts = self.scripts.lock().unwrap();
        match scripts.get(step) {
            Some(script) => {
                let outcome = script
                    .outcomes
                    .get(attempt)
                    .or_else(|| script.outcomes.last())
                    .cloned()
                    .unwrap_or_else(|| CommandOutcome::success(step));
                (outcome, script.delay)
            }
            None => (CommandOutcome::success(step), Duration::ZERO),
        }
    }
}

/// Decrements the running counter even if the attempt future is dropped
/// (e.g. on timeout).
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(
        &self,
        request: CommandRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = CommandOutcome> + Send + '_>> {
        Box::pin(async move {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let previous = calls.iter().filter(|r| r.step == request.step).count();
                calls.push(request.clone());
                previous
            };

            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            let _guard = RunningGuard(&self.running);

            let (outcome, delay) = self.next_outcome(&request.step, attempt);

            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return CommandOutcome::cancelled(),
                }
            } else {
                // Let other workers interleave.
                tokio::task::yield_now().await;
            }

            outcome
        })
    }
}
