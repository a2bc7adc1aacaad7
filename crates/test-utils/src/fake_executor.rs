use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use stepdag::dag::ScheduledStep;
use stepdag::engine::{RuntimeEvent, StepRunResult};
use stepdag::errors::{Result, StepError, StepdagError};
use stepdag::exec::ExecutorBackend;
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which steps were dispatched, in order
/// - immediately reports `StepFinished` for each of them: `Failed` for
///   steps listed in `failing`, `Completed` otherwise
/// - records whether the runtime asked it to cancel in-flight work
///
/// It bypasses the step runner entirely, so it exercises only the
/// coordinator.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
    cancelled: Arc<Mutex<bool>>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: HashSet::new(),
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    pub fn failing(mut self, step: &str) -> Self {
        self.failing.insert(step.to_string());
        self
    }

    /// Shared flag flipped when `cancel_in_flight` is called.
    pub fn cancel_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.cancelled)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for s in steps {
                let name = s.name().to_string();
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(name.clone());
                }

                let result = if failing.contains(&name) {
                    StepRunResult::failed(
                        1,
                        StepError::Execution {
                            code: Some(1),
                            stderr: format!("{name} failed"),
                        },
                        None,
                    )
                } else {
                    StepRunResult::completed(1, Some(name.clone()))
                };

                tx.send(RuntimeEvent::StepFinished { step: name, result })
                    .await
                    .map_err(|e| StepdagError::Internal(e.to_string()))?;
            }
            Ok(())
        })
    }

    fn cancel_in_flight(&mut self) {
        *self.cancelled.lock().unwrap() = true;
    }
}
