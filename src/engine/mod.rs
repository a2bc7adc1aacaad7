// src/engine/mod.rs

//! Orchestration engine for stepdag.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the main runtime event loop that reacts to:
//!   - attempt / retry notices from workers
//!   - step completion events
//!   - stop requests (Ctrl-C)
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dag::{DagGraph, Scheduler, SkipReason, StepExecutionState, StepName, StepStatus};
use crate::errors::{Result, StepError};
use crate::exec::{CommandRunner, RealExecutorBackend};

/// Terminal result a worker reports for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRunResult {
    pub status: StepStatus,
    /// Attempts actually made (0 when the command never ran).
    pub attempts: u32,
    /// Captured output of the final attempt.
    pub output: Option<String>,
    pub error: Option<StepError>,
    pub skip_reason: Option<SkipReason>,
}

impl StepRunResult {
    pub fn completed(attempts: u32, output: Option<String>) -> Self {
        Self {
            status: StepStatus::Completed,
            attempts,
            output,
            error: None,
            skip_reason: None,
        }
    }

    pub fn failed(attempts: u32, error: StepError, output: Option<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            attempts,
            output,
            error: Some(error),
            skip_reason: None,
        }
    }

    pub fn skipped(reason: SkipReason) -> Self {
        let error = match &reason {
            SkipReason::ConditionError { message } => Some(StepError::Condition(message.clone())),
            _ => None,
        };
        Self {
            status: StepStatus::Skipped,
            attempts: 0,
            output: None,
            error,
            skip_reason: Some(reason),
        }
    }

    pub fn cancelled(attempts: u32, output: Option<String>) -> Self {
        Self {
            status: StepStatus::Cancelled,
            attempts,
            output,
            error: None,
            skip_reason: None,
        }
    }
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Maximum number of steps running at once.
    pub concurrency_limit: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 4,
        }
    }
}

/// Events flowing into the runtime from workers and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A worker is about to run attempt `attempt` (1-based) of a step.
    AttemptStarted { step: StepName, attempt: u32 },
    /// An attempt failed and the worker is waiting out the retry delay.
    StepRetrying {
        step: StepName,
        attempt: u32,
        error: StepError,
    },
    /// A worker reached a terminal state for its step.
    StepFinished {
        step: StepName,
        result: StepRunResult,
    },
    /// Stop requested (e.g. Ctrl-C).
    StopRequested,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::Runtime;

/// Run a validated graph to completion with the given command runner.
///
/// Wires a [`Scheduler`], a [`CoreRuntime`] and a [`Runtime`] backed by
/// [`RealExecutorBackend`]. Cancelling `stop` behaves like a Ctrl-C: pending
/// work is cancelled and in-flight workers are asked to stop.
///
/// Returns the final per-step states, or an error if the coordinator itself
/// faulted.
pub async fn run_graph(
    graph: DagGraph,
    runner: Arc<dyn CommandRunner>,
    options: RunOptions,
    stop: CancellationToken,
) -> Result<BTreeMap<StepName, StepExecutionState>> {
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let cancel = CancellationToken::new();
    let executor = RealExecutorBackend::new(runner, rt_tx.clone(), cancel.clone());

    {
        let tx = rt_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {
                    let _ = tx.send(RuntimeEvent::StopRequested).await;
                }
                _ = cancel.cancelled() => {}
            }
        });
    }
    drop(rt_tx);

    let scheduler = Scheduler::new(graph, options.concurrency_limit);
    let core = CoreRuntime::new(scheduler);
    let runtime = Runtime::new(core, rt_rx, executor);
    let states = runtime.run().await;

    // Release the stop watcher if the run ended on its own.
    cancel.cancel();
    states
}
