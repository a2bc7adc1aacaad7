// src/report/mod.rs

//! Execution report: the per-run summary written after every run.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::dag::{SkipReason, StepExecutionState, StepName, StepStatus};

pub mod writer;

pub use writer::{report_file_name, write_report};

/// Summary of one process run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub process: String,
    pub timestamp: DateTime<Local>,
    /// `true` iff the step ended `Completed`.
    pub results: BTreeMap<StepName, bool>,
    /// Completed steps over total steps; 0 for an empty process.
    pub success_rate: f64,
    pub success: bool,
    pub steps: BTreeMap<StepName, StepReport>,
}

/// Per-step diagnostics carried alongside the boolean results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
}

impl From<&StepExecutionState> for StepReport {
    fn from(state: &StepExecutionState) -> Self {
        let duration_ms = match (state.started_at, state.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        };

        Self {
            status: state.status,
            attempts: state.attempt,
            started_at: state.started_at,
            ended_at: state.ended_at,
            duration_ms,
            error: state.error.clone(),
            skip_reason: state.skip_reason.clone(),
        }
    }
}

impl ExecutionReport {
    /// Build a report from final step states, stamped with the current time.
    pub fn generate(process: &str, states: &BTreeMap<StepName, StepExecutionState>) -> Self {
        Self::generate_at(process, states, Local::now())
    }

    pub fn generate_at(
        process: &str,
        states: &BTreeMap<StepName, StepExecutionState>,
        timestamp: DateTime<Local>,
    ) -> Self {
        let results: BTreeMap<StepName, bool> = states
            .iter()
            .map(|(name, state)| (name.clone(), state.status == StepStatus::Completed))
            .collect();

        let completed = results.values().filter(|ok| **ok).count();
        let success_rate = if results.is_empty() {
            0.0
        } else {
            completed as f64 / results.len() as f64
        };

        Self {
            process: process.to_string(),
            timestamp,
            results,
            success_rate,
            success: overall_success(states.values()),
            steps: states
                .iter()
                .map(|(name, state)| (name.clone(), StepReport::from(state)))
                .collect(),
        }
    }

    /// Steps in a given status, sorted by name.
    pub fn steps_with_status(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|(_, s)| s.status == status)
            .map(|(n, _)| n.as_str())
            .collect()
    }
}

/// A run succeeds when nothing failed or was cancelled, and every skip was
/// legitimate (condition-driven rather than caused by an upstream failure).
pub fn overall_success<'a>(states: impl IntoIterator<Item = &'a StepExecutionState>) -> bool {
    states.into_iter().all(|state| match state.status {
        StepStatus::Failed | StepStatus::Cancelled => false,
        StepStatus::Skipped => !state
            .skip_reason
            .as_ref()
            .is_some_and(SkipReason::is_failure_driven),
        _ => true,
    })
}
