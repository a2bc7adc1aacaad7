// src/exec/backend.rs

//! Where dispatched steps go.
//!
//! The coordinator only sees [`ExecutorBackend`]. [`RealExecutorBackend`]
//! forwards steps to the worker loop in
//! [`executor_loop`](super::executor_loop); tests substitute a backend that
//! answers with `StepFinished` straight away.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dag::ScheduledStep;
use crate::engine::RuntimeEvent;
use crate::errors::{Result, StepdagError};

use super::command::CommandRunner;
use super::executor_loop::spawn_executor;

/// Accepts steps the scheduler has marked `Running` and makes sure each one
/// eventually reports a terminal `StepFinished`.
pub trait ExecutorBackend: Send {
    /// Hand `steps` over for execution. Returns once they are queued, not
    /// once they finish.
    fn spawn_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every in-flight step to stop cooperatively. Each worker still
    /// reports a terminal result.
    fn cancel_in_flight(&mut self);
}

/// Backend that runs steps through a [`CommandRunner`] on worker tasks.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ScheduledStep>,
    cancel: CancellationToken,
}

impl RealExecutorBackend {
    /// Starts the worker loop right away; workers report on `runtime_tx` and
    /// all watch `cancel`.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let tx = spawn_executor(runner, runtime_tx, cancel.clone());
        Self { tx, cancel }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.tx.clone();

        Box::pin(async move {
            for step in steps {
                let name = step.name().to_string();
                tx.send(step).await.map_err(|_| {
                    StepdagError::Internal(format!(
                        "executor loop stopped before step '{name}' could be dispatched"
                    ))
                })?;
            }
            Ok(())
        })
    }

    fn cancel_in_flight(&mut self) {
        self.cancel.cancel();
    }
}
