// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::debug;

use crate::dag::{ScheduledStep, Scheduler, SchedulerStep, StepName};
use crate::engine::StepRunResult;
use crate::errors::{Result, StepError};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these steps to the executor.
    DispatchSteps(Vec<ScheduledStep>),
    /// Ask every in-flight worker to stop cooperatively.
    CancelInFlight,
    /// Every step is terminal; the shell can stop reading events.
    Finish,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}

/// Translate a scheduler step into shell commands.
///
/// Cancellation goes first so freshly cancelled work is never dispatched
/// after the stop signal.
pub fn commands_from(step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if step.cancel_in_flight {
        commands.push(CoreCommand::CancelInFlight);
    }
    if !step.dispatched.is_empty() {
        commands.push(CoreCommand::DispatchSteps(step.dispatched));
    }

    let keep_running = !step.run_just_finished;
    if !keep_running {
        commands.push(CoreCommand::Finish);
    }

    CoreStep {
        commands,
        keep_running,
    }
}

/// Seed the run.
pub fn handle_start(scheduler: &mut Scheduler) -> Result<CoreStep> {
    let step = scheduler.start()?;
    Ok(commands_from(step))
}

/// Handle a worker starting a retry attempt.
pub fn handle_attempt_started(
    scheduler: &mut Scheduler,
    step: StepName,
    attempt: u32,
) -> Result<CoreStep> {
    scheduler.attempt_started(&step, attempt)?;
    Ok(CoreStep::idle())
}

/// Handle a failed attempt that will be retried.
pub fn handle_step_retrying(
    scheduler: &mut Scheduler,
    step: StepName,
    attempt: u32,
    error: StepError,
) -> Result<CoreStep> {
    scheduler.attempt_failed(&step, attempt, &error.to_string())?;
    Ok(CoreStep::idle())
}

/// Handle a worker's terminal result.
pub fn handle_step_finished(
    scheduler: &mut Scheduler,
    step: StepName,
    result: StepRunResult,
) -> Result<CoreStep> {
    let out = scheduler.step_finished(&step, result)?;
    debug!(
        step = %step,
        dispatched = out.dispatched.len(),
        skipped = out.newly_skipped.len(),
        cancelled = out.newly_cancelled.len(),
        "completion processed"
    );
    Ok(commands_from(out))
}

/// Handle an external stop request.
pub fn handle_stop_requested(scheduler: &mut Scheduler) -> Result<CoreStep> {
    let out = scheduler.request_stop()?;
    Ok(commands_from(out))
}
