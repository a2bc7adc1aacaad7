// src/dag/status.rs

//! Per-step status and execution state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::dag::StepName;

/// Status of a step within a single run.
///
/// Allowed transitions (anything else is rejected by
/// [`StepExecutionState::transition`]):
///
/// ```text
/// Pending  -> Ready | Skipped | Cancelled
/// Ready    -> Running | Skipped | Cancelled
/// Running  -> Completed | Failed | Retrying | Skipped | Cancelled
/// Retrying -> Running | Failed | Cancelled
/// ```
///
/// `Running -> Skipped` happens when the step's condition is evaluated false
/// by the step runner; `Retrying -> Failed` when the runner gives up during a
/// retry delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Retrying,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled
        )
    }

    /// Running or waiting between attempts: occupies a concurrency slot.
    pub fn is_in_flight(self) -> bool {
        matches!(self, StepStatus::Running | StepStatus::Retrying)
    }

    pub fn can_transition_to(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Ready | Skipped | Cancelled)
                | (Ready, Running | Skipped | Cancelled)
                | (Running, Completed | Failed | Retrying | Skipped | Cancelled)
                | (Retrying, Running | Failed | Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Retrying => "retrying",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
            StepStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step ended up `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The step's condition evaluated to false.
    ConditionNotMet,
    /// The condition was malformed or could not be evaluated.
    ConditionError { message: String },
    /// A dependency failed or was cancelled (directly or further upstream).
    UpstreamFailed { dependency: StepName },
    /// A dependency was skipped for a reason that is not itself a failure.
    UpstreamSkipped { dependency: StepName },
}

impl SkipReason {
    /// Skips caused by an upstream failure make the run fail.
    pub fn is_failure_driven(&self) -> bool {
        matches!(self, SkipReason::UpstreamFailed { .. })
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ConditionNotMet => f.write_str("condition not met"),
            SkipReason::ConditionError { message } => write!(f, "condition error: {message}"),
            SkipReason::UpstreamFailed { dependency } => {
                write!(f, "dependency '{dependency}' did not complete (failure upstream)")
            }
            SkipReason::UpstreamSkipped { dependency } => {
                write!(f, "dependency '{dependency}' was skipped")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition for step '{step}': {from} -> {to}")]
pub struct TransitionError {
    pub step: StepName,
    pub from: StepStatus,
    pub to: StepStatus,
}

/// Mutable per-run state of one step, owned by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepExecutionState {
    pub status: StepStatus,
    /// Number of attempts started so far. Stays 0 for a step that never ran
    /// its command.
    pub attempt: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub skip_reason: Option<SkipReason>,
}

impl Default for StepExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl StepExecutionState {
    pub fn new() -> Self {
        Self {
            status: StepStatus::Pending,
            attempt: 0,
            started_at: None,
            ended_at: None,
            output: None,
            error: None,
            skip_reason: None,
        }
    }

    /// Move to `next`, enforcing the transition table.
    ///
    /// Stamps `started_at` on the first move to `Running` and `ended_at` on
    /// reaching a terminal status.
    pub fn transition(&mut self, step: &str, next: StepStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                step: step.to_string(),
                from: self.status,
                to: next,
            });
        }

        if next == StepStatus::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        self.status = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
