// src/dag/scheduler.rs

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::condition::{ConditionContext, StepSnapshot};
use crate::dag::graph::DagGraph;
use crate::dag::queue::ReadyQueue;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::status::{StepExecutionState, StepStatus, TransitionError};
use crate::dag::step::{ScheduledStep, StepName};
use crate::engine::StepRunResult;
use crate::errors::{Result, StepdagError};

/// Why the run stopped dispatching new work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// A critical step exhausted its retries.
    CriticalFailure { step: StepName },
    /// The caller asked the run to stop (e.g. Ctrl-C).
    StopRequested,
}

/// Scheduler holds the immutable graph plus mutable per-run state.
///
/// It is responsible for:
/// - deciding when a step is ready (all dependencies completed)
/// - bounding how many steps run at once, queueing the rest
/// - recording attempt / retry / completion transitions reported by workers
/// - skipping dependents of steps that did not complete
/// - cancelling unstarted work when a critical step fails
///
/// It performs no IO; the runtime feeds it events one at a time, which makes
/// every transition a sequential, auditable log.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    states: HashMap<StepName, StepExecutionState>,
    ready: ReadyQueue,
    concurrency_limit: usize,
    in_flight: usize,
    cancellation: Option<CancelReason>,
    started: bool,
}

fn internal(err: TransitionError) -> StepdagError {
    StepdagError::Internal(err.to_string())
}

impl Scheduler {
    /// Create per-run state for every step of `graph` (all `Pending`).
    ///
    /// `concurrency_limit` is clamped to at least 1.
    pub fn new(graph: DagGraph, concurrency_limit: usize) -> Self {
        let states = graph
            .step_names()
            .map(|name| (name.to_string(), StepExecutionState::new()))
            .collect();

        Self {
            graph,
            states,
            ready: ReadyQueue::new(),
            concurrency_limit: concurrency_limit.max(1),
            in_flight: 0,
            cancellation: None,
            started: false,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Number of steps currently `Running` or `Retrying`.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Number of steps `Ready` and waiting for a slot.
    pub fn queued(&self) -> usize {
        self.ready.len()
    }

    pub fn cancellation(&self) -> Option<&CancelReason> {
        self.cancellation.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }

    /// Every step terminal and no worker outstanding.
    pub fn is_finished(&self) -> bool {
        self.in_flight == 0 && self.states.values().all(|s| s.status.is_terminal())
    }

    pub fn state_of(&self, step: &str) -> Option<&StepExecutionState> {
        self.states.get(step)
    }

    pub fn status_of(&self, step: &str) -> Option<StepStatus> {
        self.states.get(step).map(|s| s.status)
    }

    /// Whether every dependency of `step` has completed.
    ///
    /// Returns `None` if the step is unknown.
    pub fn deps_satisfied(&self, step: &str) -> Option<bool> {
        if !self.graph.contains(step) {
            return None;
        }
        let mgr = ReadOnlyStateManager::new(&self.graph, &self.states);
        Some(mgr.deps_satisfied(step))
    }

    /// Returns step names in declaration order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.graph.step_names()
    }

    /// Final per-step states. Meant to be called once the run is finished.
    pub fn into_states(self) -> BTreeMap<StepName, StepExecutionState> {
        self.states.into_iter().collect()
    }

    pub fn states(&self) -> BTreeMap<StepName, StepExecutionState> {
        self.states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Seed the run: promote every step with no unmet prerequisites and
    /// dispatch up to the concurrency limit.
    pub fn start(&mut self) -> Result<SchedulerStep> {
        if self.started {
            warn!("scheduler: start called twice; ignoring");
            return Ok(SchedulerStep::default());
        }
        self.started = true;

        info!(
            steps = self.graph.len(),
            concurrency_limit = self.concurrency_limit,
            "scheduler: starting run"
        );

        let all: Vec<StepName> = self.graph.step_names().map(str::to_string).collect();
        let mut step = SchedulerStep::default();
        {
            let mut manager = StateManager::new(&self.graph, &mut self.states, &mut self.ready);
            let promotion = manager.promote(all).map_err(internal)?;
            step.newly_skipped = promotion.newly_skipped;
        }

        step.dispatched = self.dispatch_ready()?;
        step.run_just_finished = self.is_finished();
        Ok(step)
    }

    /// A worker started attempt `attempt` of `step`. After a retry delay
    /// this moves the step from Retrying back to Running.
    pub fn attempt_started(&mut self, step: &str, attempt: u32) -> Result<()> {
        let Some(state) = self.states.get_mut(step) else {
            warn!(step = %step, "attempt start for unknown step; ignoring");
            return Ok(());
        };

        if state.status == StepStatus::Retrying {
            state.transition(step, StepStatus::Running).map_err(internal)?;
        }
        state.attempt = state.attempt.max(attempt);
        debug!(step = %step, attempt, "attempt started");
        Ok(())
    }

    /// A worker's attempt failed and it will retry after the step's delay.
    pub fn attempt_failed(&mut self, step: &str, attempt: u32, error: &str) -> Result<()> {
        let Some(state) = self.states.get_mut(step) else {
            warn!(step = %step, "retry notice for unknown step; ignoring");
            return Ok(());
        };

        state.transition(step, StepStatus::Retrying).map_err(internal)?;
        state.attempt = state.attempt.max(attempt);
        state.error = Some(error.to_string());
        debug!(step = %step, attempt, error = %error, "attempt failed; Retrying");
        Ok(())
    }

    /// A worker finished `step` with a terminal result.
    pub fn step_finished(&mut self, step: &str, result: StepRunResult) -> Result<SchedulerStep> {
        let critical = match self.graph.step(step) {
            Some(def) => def.critical,
            None => {
                warn!(step = %step, "completion for unknown step; ignoring");
                return Ok(SchedulerStep::default());
            }
        };

        let Some(state) = self.states.get_mut(step) else {
            return Ok(SchedulerStep::default());
        };

        if !state.status.is_in_flight() {
            return Err(StepdagError::Internal(format!(
                "completion for step '{step}' which is not in flight (status {})",
                state.status
            )));
        }
        if !result.status.is_terminal() {
            return Err(StepdagError::Internal(format!(
                "worker reported non-terminal status {} for step '{step}'",
                result.status
            )));
        }

        state.transition(step, result.status).map_err(internal)?;
        state.attempt = state.attempt.max(result.attempts);
        if result.output.is_some() {
            state.output = result.output;
        }
        match result.error {
            Some(err) => state.error = Some(err.to_string()),
            None if result.status == StepStatus::Completed => state.error = None,
            None => {}
        }
        state.skip_reason = result.skip_reason;
        self.in_flight = self.in_flight.saturating_sub(1);

        let mut out = SchedulerStep::default();
        match result.status {
            StepStatus::Completed => {
                info!(step = %step, attempts = result.attempts, "step completed");
            }
            StepStatus::Failed if critical => {
                warn!(
                    step = %step,
                    attempts = result.attempts,
                    "critical step failed; cancelling remaining steps"
                );
                self.cancel(
                    CancelReason::CriticalFailure {
                        step: step.to_string(),
                    },
                    &mut out,
                )?;
            }
            StepStatus::Failed => {
                warn!(
                    step = %step,
                    attempts = result.attempts,
                    "non-critical step failed; skipping its dependents"
                );
            }
            StepStatus::Skipped => {
                info!(step = %step, "step skipped by its condition");
            }
            StepStatus::Cancelled => {
                info!(step = %step, "in-flight step stopped after cancellation");
            }
            _ => {}
        }

        {
            let mut manager = StateManager::new(&self.graph, &mut self.states, &mut self.ready);
            let followers = manager.followers_of(step);
            let promotion = manager.promote(followers).map_err(internal)?;
            out.newly_skipped.extend(promotion.newly_skipped);
        }

        out.dispatched = self.dispatch_ready()?;
        out.run_just_finished = self.is_finished();
        if out.run_just_finished {
            info!("scheduler: all steps terminal; run finished");
        }
        Ok(out)
    }

    /// External stop request; handled exactly like a critical failure.
    pub fn request_stop(&mut self) -> Result<SchedulerStep> {
        let mut out = SchedulerStep::default();
        if self.cancellation.is_some() {
            debug!("stop requested while already cancelling; ignoring");
            return Ok(out);
        }

        warn!("stop requested; cancelling remaining steps");
        self.cancel(CancelReason::StopRequested, &mut out)?;
        out.run_just_finished = self.is_finished();
        Ok(out)
    }

    fn cancel(&mut self, reason: CancelReason, out: &mut SchedulerStep) -> Result<()> {
        if self.cancellation.is_some() {
            return Ok(());
        }
        self.cancellation = Some(reason);

        let mut manager = StateManager::new(&self.graph, &mut self.states, &mut self.ready);
        out.newly_cancelled = manager.cancel_unstarted().map_err(internal)?;
        out.cancel_in_flight = true;
        Ok(())
    }

    /// Pop ready steps into free slots, marking them `Running`.
    fn dispatch_ready(&mut self) -> Result<Vec<ScheduledStep>> {
        let mut dispatched = Vec::new();
        if self.cancellation.is_some() {
            return Ok(dispatched);
        }

        while self.in_flight < self.concurrency_limit {
            let Some(name) = self.ready.pop() else {
                break;
            };
            let Some(index) = self.graph.index_of(&name) else {
                continue;
            };

            let context = self.snapshot_for(&name);
            let Some(state) = self.states.get_mut(&name) else {
                continue;
            };
            state.transition(&name, StepStatus::Running).map_err(internal)?;
            self.in_flight += 1;

            debug!(
                step = %name,
                in_flight = self.in_flight,
                limit = self.concurrency_limit,
                "dispatching step"
            );

            dispatched.push(ScheduledStep {
                definition: self.graph.steps()[index].clone(),
                context,
                index,
            });
        }

        if !self.ready.is_empty() {
            debug!(
                queued = self.ready.len(),
                "concurrency limit reached; steps waiting for a slot"
            );
        }

        Ok(dispatched)
    }

    /// Read-only view of the steps referenced by `step`'s condition.
    fn snapshot_for(&self, step: &str) -> ConditionContext {
        let mut ctx = ConditionContext::new();
        for target in self.graph.condition_refs_of(step) {
            if let Some(state) = self.states.get(target) {
                ctx.insert(
                    target.clone(),
                    StepSnapshot {
                        status: state.status,
                        output: state.output.clone(),
                    },
                );
            }
        }
        ctx
    }
}
