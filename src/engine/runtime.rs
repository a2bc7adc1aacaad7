// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::{ScheduledStep, StepExecutionState, StepName};
use crate::errors::{Result, StepdagError};
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// The coordinator task of one run.
///
/// Owns the [`CoreRuntime`] and is the only place that touches it. Worker
/// notices arrive on `events`; whatever the core decides is carried out
/// against the [`ExecutorBackend`]. No scheduling decision is made here.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    events: mpsc::Receiver<RuntimeEvent>,
    backend: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, events: mpsc::Receiver<RuntimeEvent>, backend: E) -> Self {
        Self {
            core,
            events,
            backend,
        }
    }

    /// Run until every step is terminal and return the final states.
    ///
    /// The first batch of root steps is dispatched before any event is read.
    /// If the event channel closes while steps are still in flight the run
    /// cannot finish, which is reported as [`StepdagError::Internal`].
    pub async fn run(mut self) -> Result<BTreeMap<StepName, StepExecutionState>> {
        info!("coordinator started");

        let mut pending = self.core.start()?;

        loop {
            for command in pending.commands {
                self.apply(command).await?;
            }
            if !pending.keep_running {
                break;
            }

            let Some(event) = self.events.recv().await else {
                return Err(StepdagError::Internal(format!(
                    "runtime event channel closed with {} step(s) in flight",
                    self.core.in_flight()
                )));
            };

            debug!(?event, "coordinator received event");
            pending = self.core.step(event)?;
        }

        info!("coordinator finished");
        Ok(self.core.into_states())
    }

    async fn apply(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchSteps(steps) => self.dispatch(steps).await,
            CoreCommand::CancelInFlight => {
                info!("asking in-flight steps to stop");
                self.backend.cancel_in_flight();
                Ok(())
            }
            CoreCommand::Finish => {
                info!("all steps reached a terminal state");
                Ok(())
            }
        }
    }

    async fn dispatch(&mut self, steps: Vec<ScheduledStep>) -> Result<()> {
        if steps.is_empty() {
            return Ok(());
        }

        debug!(
            steps = ?steps.iter().map(ScheduledStep::name).collect::<Vec<_>>(),
            "handing steps to the executor"
        );
        self.backend.spawn_steps(steps).await
    }
}
