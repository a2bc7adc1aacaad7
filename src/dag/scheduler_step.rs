// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::step::{ScheduledStep, StepName};

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the run and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Steps handed to workers as a result of this step (now `Running`).
    pub dispatched: Vec<ScheduledStep>,
    /// Steps newly marked `Skipped` by the cascade.
    pub newly_skipped: Vec<StepName>,
    /// Steps newly marked `Cancelled` before dispatch.
    pub newly_cancelled: Vec<StepName>,
    /// In-flight workers should be asked to stop.
    pub cancel_in_flight: bool,
    /// Whether this step caused the run to finish (every step terminal and
    /// nothing in flight).
    pub run_just_finished: bool,
}

impl SchedulerStep {
    pub fn dispatched_names(&self) -> Vec<StepName> {
        self.dispatched
            .iter()
            .map(|s| s.definition.name.clone())
            .collect()
    }
}
