// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] validates step lists into an acyclic graph.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which steps are ready to run, and what happens when one finishes.
//! - [`step`] provides step definitions and the dispatch record.
//! - [`status`] holds the step lifecycle and its transition table.
//! - [`queue`] is the FIFO of ready steps waiting for a concurrency slot.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod queue;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod status;
pub mod step;

pub use graph::DagGraph;
pub use queue::ReadyQueue;
pub use scheduler::{CancelReason, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use status::{SkipReason, StepExecutionState, StepStatus, TransitionError};
pub use step::{ProcessDefinition, ScheduledStep, StepDefinition, StepName};
