// src/condition/mod.rs

//! Step run conditions.
//!
//! A condition is a small, closed predicate over the terminal statuses (and
//! captured output) of other steps in the same run:
//!
//! ```text
//! step build failed
//! completed(lint) && !skipped(test)
//! output(probe) contains "ready" or step probe cancelled
//! ```
//!
//! - [`ast`] holds the predicate tree and its evaluator.
//! - [`parser`] turns the config string into that tree, once, at load time.
//!
//! Nothing here ever executes user-provided code.

pub mod ast;
pub mod parser;

use std::fmt;

use thiserror::Error;

use crate::dag::StepName;

pub use ast::{Condition, ConditionContext, StepSnapshot};
pub use parser::parse_condition;

/// Errors produced while parsing or evaluating a condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("malformed condition at offset {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("condition references step '{0}' which is not available to this step")]
    MissingStep(StepName),

    #[error("condition references step '{0}' which has not finished yet")]
    NotTerminal(StepName),
}

/// A condition as attached to a step definition.
///
/// The original source text is kept alongside the parse result: a malformed
/// condition does not reject the whole process, it only makes its own step
/// skip at run time (with a warning).
#[derive(Debug, Clone, PartialEq)]
pub struct StepCondition {
    source: String,
    parsed: Result<Condition, ConditionError>,
}

impl StepCondition {
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        let parsed = parse_condition(&source);
        Self { source, parsed }
    }

    pub fn from_condition(condition: Condition) -> Self {
        Self {
            source: condition.to_string(),
            parsed: Ok(condition),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parsed(&self) -> Result<&Condition, &ConditionError> {
        self.parsed.as_ref()
    }

    pub fn is_malformed(&self) -> bool {
        self.parsed.is_err()
    }

    /// Steps this condition looks at. Empty for a malformed condition.
    pub fn referenced_steps(&self) -> Vec<StepName> {
        match &self.parsed {
            Ok(cond) => cond.referenced_steps(),
            Err(_) => Vec::new(),
        }
    }

    pub fn evaluate(&self, ctx: &ConditionContext) -> Result<bool, ConditionError> {
        match &self.parsed {
            Ok(cond) => cond.evaluate(ctx),
            Err(e) => Err(e.clone()),
        }
    }
}

impl fmt::Display for StepCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
