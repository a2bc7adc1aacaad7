// src/exec/step_runner.rs

//! Runs one dispatched step to a terminal result.
//!
//! The runner owns everything that happens between "the scheduler handed
//! this step to a worker" and "the worker reports a terminal status":
//! the condition gate, the attempt loop, per-attempt timeouts and the retry
//! delay. It talks back to the coordinator only through `RuntimeEvent`s.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dag::{ScheduledStep, SkipReason};
use crate::engine::{RuntimeEvent, StepRunResult};
use crate::errors::StepError;
use crate::exec::command::{CommandOutcome, CommandRequest, CommandRunner, CommandStatus};

/// Executes a [`ScheduledStep`] against a [`CommandRunner`].
pub struct StepRunner {
    runner: Arc<dyn CommandRunner>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
}

/// Result of a single attempt.
enum Attempt {
    Succeeded(Option<String>),
    Failed(StepError, Option<String>),
    Cancelled(Option<String>),
}

impl StepRunner {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runner,
            runtime_tx,
            cancel,
        }
    }

    /// Run the step and report its terminal result as `StepFinished`.
    pub async fn run_step(&self, step: ScheduledStep) {
        let name = step.name().to_string();
        let result = self.execute(&step).await;

        debug!(step = %name, status = %result.status, attempts = result.attempts, "worker finished");

        if self
            .runtime_tx
            .send(RuntimeEvent::StepFinished { step: name.clone(), result })
            .await
            .is_err()
        {
            error!(step = %name, "runtime channel closed; dropping step result");
        }
    }

    /// Produce the terminal result for `step` without reporting it.
    pub async fn execute(&self, step: &ScheduledStep) -> StepRunResult {
        let def = &step.definition;

        if let Some(condition) = &def.condition {
            match condition.evaluate(&step.context) {
                Ok(true) => {
                    debug!(step = %def.name, condition = %condition, "condition holds");
                }
                Ok(false) => {
                    info!(step = %def.name, condition = %condition, "condition not met; skipping");
                    return StepRunResult::skipped(SkipReason::ConditionNotMet);
                }
                Err(err) => {
                    warn!(
                        step = %def.name,
                        condition = %condition,
                        error = %err,
                        "condition could not be evaluated; skipping"
                    );
                    return StepRunResult::skipped(SkipReason::ConditionError {
                        message: err.to_string(),
                    });
                }
            }
        }

        let max_attempts = def.max_attempts();
        let mut last_output = None;

        for attempt in 1..=max_attempts {
            if self.cancel.is_cancelled() {
                info!(step = %def.name, attempt, "run cancelled before attempt");
                return StepRunResult::cancelled(attempt - 1, last_output);
            }

            self.notify(RuntimeEvent::AttemptStarted {
                step: def.name.clone(),
                attempt,
            })
            .await;

            debug!(step = %def.name, attempt, max_attempts, "starting attempt");

            let (err, output) = match self.attempt(step).await {
                Attempt::Succeeded(output) => {
                    if attempt > 1 {
                        info!(step = %def.name, attempt, max_attempts, "step succeeded after retry");
                    }
                    return StepRunResult::completed(attempt, output);
                }
                Attempt::Cancelled(output) => {
                    info!(step = %def.name, attempt, "attempt stopped by cancellation");
                    return StepRunResult::cancelled(attempt, output);
                }
                Attempt::Failed(err, output) => (err, output),
            };
            last_output = output;

            if attempt == max_attempts {
                warn!(step = %def.name, attempt, error = %err, "step failed; retries exhausted");
                return StepRunResult::failed(attempt, err, last_output);
            }

            warn!(
                step = %def.name,
                attempt,
                max_attempts,
                error = %err,
                delay = ?def.retry_delay,
                "attempt failed; retrying"
            );
            self.notify(RuntimeEvent::StepRetrying {
                step: def.name.clone(),
                attempt,
                error: err,
            })
            .await;

            tokio::select! {
                _ = tokio::time::sleep(def.retry_delay) => {}
                _ = self.cancel.cancelled() => {
                    info!(step = %def.name, attempt, "run cancelled during retry delay");
                    return StepRunResult::cancelled(attempt, last_output);
                }
            }
        }

        // Only reachable with zero attempts, which `max_attempts` rules out.
        StepRunResult::failed(
            0,
            StepError::Execution {
                code: None,
                stderr: "no attempt was made".to_string(),
            },
            last_output,
        )
    }

    async fn attempt(&self, step: &ScheduledStep) -> Attempt {
        let def = &step.definition;
        let request = CommandRequest {
            step: def.name.clone(),
            command: def.command.clone(),
            environment: def.environment.clone(),
            timeout: def.timeout,
        };

        // Dropping the runner future on timeout releases the child process.
        let outcome = match tokio::time::timeout(
            def.timeout,
            self.runner.run(request, self.cancel.clone()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                return Attempt::Failed(StepError::Timeout(def.timeout), None);
            }
        };

        let output = outcome.combined_output();
        let CommandOutcome { status, stderr, .. } = outcome;
        match status {
            CommandStatus::Success => Attempt::Succeeded(output),
            CommandStatus::Cancelled => Attempt::Cancelled(output),
            CommandStatus::TimedOut => Attempt::Failed(StepError::Timeout(def.timeout), output),
            CommandStatus::Failed { exit_code } => Attempt::Failed(
                StepError::Execution {
                    code: exit_code,
                    stderr,
                },
                output,
            ),
            CommandStatus::SpawnFailed(message) => {
                Attempt::Failed(StepError::Spawn(message), output)
            }
        }
    }

    async fn notify(&self, event: RuntimeEvent) {
        if self.runtime_tx.send(event).await.is_err() {
            debug!("runtime channel closed; dropping progress event");
        }
    }
}
