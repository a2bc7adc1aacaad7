// src/exec/executor_loop.rs

//! Main executor loop that manages running step workers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledStep;
use crate::engine::RuntimeEvent;
use crate::exec::command::CommandRunner;
use crate::exec::step_runner::StepRunner;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<ScheduledStep>` is what
/// `RealExecutorBackend` uses to hand work over. Each scheduled step is
/// executed in its own Tokio task, and **per step name there will never be
/// more than one worker running at the same time**: a duplicate dispatch for
/// a step whose worker is still alive is ignored.
///
/// Every worker shares `cancel`; firing it asks all in-flight steps to stop.
pub fn spawn_executor(
    runner: Arc<dyn CommandRunner>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    cancel: CancellationToken,
) -> mpsc::Sender<ScheduledStep> {
    let (tx, mut rx) = mpsc::channel::<ScheduledStep>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let step_runner = Arc::new(StepRunner::new(runner, runtime_tx, cancel));
        let mut active: HashMap<String, tokio::task::JoinHandle<()>> = HashMap::new();

        while let Some(step) = rx.recv().await {
            handle_scheduled_step(step, &mut active, &step_runner);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

/// Handle a newly scheduled step.
fn handle_scheduled_step(
    step: ScheduledStep,
    active: &mut HashMap<String, tokio::task::JoinHandle<()>>,
    step_runner: &Arc<StepRunner>,
) {
    let name = step.name().to_string();

    if let Some(existing) = active.get(&name) {
        if !existing.is_finished() {
            warn!(step = %name, "step already has a live worker; ignoring duplicate dispatch");
            return;
        }
    }

    let runner = Arc::clone(step_runner);
    let spawn_name = name.clone();
    let handle = tokio::spawn(async move {
        runner.run_step(step).await;
        debug!(step = %spawn_name, "step worker future finished");
    });

    active.insert(name, handle);
}
