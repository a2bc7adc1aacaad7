// src/condition/ast.rs

use std::collections::HashMap;
use std::fmt;

use crate::condition::ConditionError;
use crate::dag::{StepName, StepStatus};

/// Predicate tree for a step condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Literal(bool),
    /// `step <name> <status>` / `<status>(<name>)`: the step ended in `status`.
    StepReached { step: StepName, status: StepStatus },
    /// `output(<name>) contains "<text>"`.
    OutputContains { step: StepName, needle: String },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

/// What a condition can see of one referenced step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSnapshot {
    pub status: StepStatus,
    pub output: Option<String>,
}

/// Read-only view of prior steps, handed to the step runner at dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionContext {
    steps: HashMap<StepName, StepSnapshot>,
}

impl ConditionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, step: impl Into<StepName>, snapshot: StepSnapshot) {
        self.steps.insert(step.into(), snapshot);
    }

    pub fn with_step(mut self, step: &str, status: StepStatus, output: Option<&str>) -> Self {
        self.insert(
            step,
            StepSnapshot {
                status,
                output: output.map(str::to_string),
            },
        );
        self
    }

    pub fn get(&self, step: &str) -> Option<&StepSnapshot> {
        self.steps.get(step)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn terminal_snapshot(&self, step: &str) -> Result<&StepSnapshot, ConditionError> {
        let snap = self
            .steps
            .get(step)
            .ok_or_else(|| ConditionError::MissingStep(step.to_string()))?;
        if !snap.status.is_terminal() {
            return Err(ConditionError::NotTerminal(step.to_string()));
        }
        Ok(snap)
    }
}

impl Condition {
    pub fn evaluate(&self, ctx: &ConditionContext) -> Result<bool, ConditionError> {
        match self {
            Condition::Literal(b) => Ok(*b),
            Condition::StepReached { step, status } => {
                Ok(ctx.terminal_snapshot(step)?.status == *status)
            }
            Condition::OutputContains { step, needle } => {
                let snap = ctx.terminal_snapshot(step)?;
                Ok(snap
                    .output
                    .as_deref()
                    .is_some_and(|out| out.contains(needle.as_str())))
            }
            Condition::Not(inner) => Ok(!inner.evaluate(ctx)?),
            // Both sides are always evaluated so that a reference to an
            // unavailable step is reported even when short-circuiting would
            // hide it.
            Condition::And(lhs, rhs) => {
                let l = lhs.evaluate(ctx)?;
                let r = rhs.evaluate(ctx)?;
                Ok(l && r)
            }
            Condition::Or(lhs, rhs) => {
                let l = lhs.evaluate(ctx)?;
                let r = rhs.evaluate(ctx)?;
                Ok(l || r)
            }
        }
    }

    /// Distinct step names referenced anywhere in the tree, in first-seen order.
    pub fn referenced_steps(&self) -> Vec<StepName> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<StepName>) {
        match self {
            Condition::Literal(_) => {}
            Condition::StepReached { step, .. } | Condition::OutputContains { step, .. } => {
                if !out.contains(step) {
                    out.push(step.clone());
                }
            }
            Condition::Not(inner) => inner.collect_refs(out),
            Condition::And(lhs, rhs) | Condition::Or(lhs, rhs) => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Literal(b) => write!(f, "{b}"),
            Condition::StepReached { step, status } => {
                write!(f, "{}({:?})", status.as_str(), step)
            }
            Condition::OutputContains { step, needle } => {
                write!(f, "output({:?}) contains {:?}", step, needle)
            }
            Condition::Not(inner) => write!(f, "!({inner})"),
            Condition::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Condition::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
        }
    }
}
