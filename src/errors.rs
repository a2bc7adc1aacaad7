// src/errors.rs

//! Crate-wide error types.
//!
//! [`StepdagError`] covers everything that stops a run before (or instead of)
//! producing a report: configuration problems, structural graph errors and
//! coordinator faults. Failures of individual steps never surface here; they
//! are recorded as [`StepError`]s inside the step's execution state.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StepdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Cycle detected in step graph: {0}")]
    CyclicDependency(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A fault inside the coordinator itself (illegal state transition,
    /// event channel closed while work was in flight, ...).
    #[error("Internal engine error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepdagError {
    /// Whether this error was raised while validating the process structure
    /// (before any step could have executed).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            StepdagError::DuplicateStep(_)
                | StepdagError::UnknownDependency { .. }
                | StepdagError::CyclicDependency(_)
                | StepdagError::ConfigError(_)
                | StepdagError::TomlError(_)
                | StepdagError::ProcessNotFound(_)
        )
    }
}

/// Error recorded against a single step attempt.
///
/// `Timeout` and `Execution` feed the retry loop; `Condition` turns the step
/// into `Skipped` without running anything.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("command failed with exit code {code:?}: {stderr}")]
    Execution { code: Option<i32>, stderr: String },

    #[error("command could not be started: {0}")]
    Spawn(String),

    #[error("condition could not be evaluated: {0}")]
    Condition(String),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StepdagError>;
