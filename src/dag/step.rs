// src/dag/step.rs

//! Step definitions and the dispatch record handed to the step runner.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::condition::{ConditionContext, StepCondition};

/// Canonical step name type used throughout the engine.
pub type StepName = String;

/// Immutable description of one unit of work plus its constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub name: StepName,
    /// Opaque instruction string passed to the command runner.
    pub command: String,
    /// Steps that must reach `Completed` before this one may run.
    pub dependencies: Vec<StepName>,
    /// Per-attempt time limit.
    pub timeout: Duration,
    /// Extra attempts after the first.
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// When true, exhausting retries cancels the whole run.
    pub critical: bool,
    /// Overrides / extends the inherited environment.
    pub environment: BTreeMap<String, String>,
    pub condition: Option<StepCondition>,
}

impl StepDefinition {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

    /// A step with the documented defaults: no dependencies, no retries,
    /// non-critical, no condition.
    pub fn new(name: impl Into<StepName>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            dependencies: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
            retry_count: 0,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            critical: false,
            environment: BTreeMap::new(),
            condition: None,
        }
    }

    /// Total attempts allowed (`retry_count + 1`).
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Steps named by this step's condition (ordering-only edges).
    pub fn condition_refs(&self) -> Vec<StepName> {
        self.condition
            .as_ref()
            .map(|c| c.referenced_steps())
            .unwrap_or_default()
    }
}

/// A named, ordered collection of steps forming the input graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessDefinition {
    pub name: String,
    pub description: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl ProcessDefinition {
    pub fn new(name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps,
        }
    }
}

/// Description of a step that the scheduler wants a worker to run now.
#[derive(Debug, Clone)]
pub struct ScheduledStep {
    pub definition: StepDefinition,
    /// Snapshot of the steps referenced by the condition, taken at dispatch.
    pub context: ConditionContext,
    /// Position in the process declaration.
    pub index: usize,
}

impl ScheduledStep {
    pub fn name(&self) -> &str {
        &self.definition.name
    }
}
