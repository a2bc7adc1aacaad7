// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledStep`s to the executor
//! - forwarding cancellation to in-flight workers
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::collections::BTreeMap;

use crate::dag::{Scheduler, StepExecutionState, StepName};
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_attempt_started, handle_start, handle_step_finished,
    handle_step_retrying, handle_stop_requested,
};
use crate::errors::Result;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Whether every step is terminal and nothing is in flight.
    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Number of workers the core still expects to hear from.
    pub fn in_flight(&self) -> usize {
        self.scheduler.in_flight()
    }

    /// Seed the run; returns the first dispatch.
    pub fn start(&mut self) -> Result<CoreStep> {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> Result<CoreStep> {
        match event {
            RuntimeEvent::AttemptStarted { step, attempt } => {
                handle_attempt_started(&mut self.scheduler, step, attempt)
            }
            RuntimeEvent::StepRetrying {
                step,
                attempt,
                error,
            } => handle_step_retrying(&mut self.scheduler, step, attempt, error),
            RuntimeEvent::StepFinished { step, result } => {
                handle_step_finished(&mut self.scheduler, step, result)
            }
            RuntimeEvent::StopRequested => handle_stop_requested(&mut self.scheduler),
        }
    }

    pub fn into_states(self) -> BTreeMap<StepName, StepExecutionState> {
        self.scheduler.into_states()
    }
}
