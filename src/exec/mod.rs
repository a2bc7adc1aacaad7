// src/exec/mod.rs

//! Step execution layer.
//!
//! This module is responsible for actually running the commands defined in
//! the steps and reporting back to the orchestration runtime via
//! `RuntimeEvent`s.
//!
//! - [`command`] defines the `CommandRunner` collaborator and the shell
//!   implementation built on `tokio::process::Command`.
//! - [`step_runner`] applies conditions, retries and timeouts to one step.
//! - [`executor_loop`] owns the main executor loop which spawns one worker
//!   per dispatched step.
//! - [`backend`] provides the `ExecutorBackend` trait and a concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.

pub mod backend;
pub mod command;
pub mod executor_loop;
pub mod step_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use command::{CommandOutcome, CommandRequest, CommandRunner, CommandStatus, ShellCommandRunner};
pub use executor_loop::spawn_executor;
pub use step_runner::StepRunner;
