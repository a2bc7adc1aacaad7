// src/dag/state_manager.rs

//! Per-run state transitions for steps: readiness, skip cascade, cancellation.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::queue::ReadyQueue;
use crate::dag::status::{SkipReason, StepExecutionState, StepStatus, TransitionError};
use crate::dag::{DagGraph, StepName};

/// Outcome of evaluating a `Pending` step against its prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// All dependencies completed and all condition references terminal.
    Ready,
    /// Something upstream is still running or waiting.
    Blocked,
    /// A dependency ended without completing.
    Skip(SkipReason),
}

/// Steps whose status changed while promoting candidates.
#[derive(Debug, Default, Clone)]
pub struct Promotion {
    pub newly_ready: Vec<StepName>,
    pub newly_skipped: Vec<StepName>,
}

/// Manages per-run state transitions for steps.
///
/// Borrows the scheduler's pieces for the duration of one operation; the
/// scheduler stays the only owner of the state map.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    states: &'a mut HashMap<StepName, StepExecutionState>,
    ready: &'a mut ReadyQueue,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        states: &'a mut HashMap<StepName, StepExecutionState>,
        ready: &'a mut ReadyQueue,
    ) -> Self {
        Self {
            graph,
            states,
            ready,
        }
    }

    fn status_of(&self, name: &str) -> Option<StepStatus> {
        self.states.get(name).map(|s| s.status)
    }

    /// Decide whether a pending step may run, must wait, or must be skipped.
    pub fn readiness(&self, name: &str) -> Readiness {
        ReadOnlyStateManager::new(self.graph, self.states).readiness(name)
    }

    fn transition(&mut self, name: &str, next: StepStatus) -> Result<(), TransitionError> {
        match self.states.get_mut(name) {
            Some(state) => state.transition(name, next),
            None => {
                // Should not happen with a validated graph.
                warn!(step = %name, "step missing from state map");
                Ok(())
            }
        }
    }

    /// Re-evaluate `candidates` (and, transitively, anything a skip reaches).
    ///
    /// - `Pending` steps whose prerequisites are satisfied become `Ready` and
    ///   are appended to the ready queue as one batch (declaration order).
    /// - `Pending` steps with a dependency that did not complete become
    ///   `Skipped`, and their own dependents are evaluated in turn.
    /// - Anything else is left alone.
    pub fn promote<I>(&mut self, candidates: I) -> Result<Promotion, TransitionError>
    where
        I: IntoIterator<Item = StepName>,
    {
        let mut promotion = Promotion::default();
        let mut batch: Vec<(usize, StepName)> = Vec::new();
        let mut work: Vec<StepName> = candidates.into_iter().collect();
        let mut seen: HashSet<StepName> = HashSet::new();

        // Process in declaration order; skips push their followers.
        work.sort_by_key(|n| std::cmp::Reverse(self.graph.index_of(n).unwrap_or(usize::MAX)));

        while let Some(name) = work.pop() {
            if self.status_of(&name) != Some(StepStatus::Pending) {
                continue;
            }

            match self.readiness(&name) {
                Readiness::Ready => {
                    if seen.insert(name.clone()) {
                        self.transition(&name, StepStatus::Ready)?;
                        debug!(step = %name, "prerequisites satisfied; marking Ready");
                        let index = self.graph.index_of(&name).unwrap_or(usize::MAX);
                        batch.push((index, name.clone()));
                        promotion.newly_ready.push(name);
                    }
                }
                Readiness::Blocked => {}
                Readiness::Skip(reason) => {
                    self.transition(&name, StepStatus::Skipped)?;
                    info!(step = %name, reason = %reason, "skipping step");
                    if let Some(state) = self.states.get_mut(&name) {
                        state.skip_reason = Some(reason);
                    }
                    let mut followers = self.followers_of(&name);
                    followers.reverse();
                    work.extend(followers);
                    promotion.newly_skipped.push(name);
                }
            }
        }

        self.ready.push_batch(batch);
        Ok(promotion)
    }

    /// Direct dependents plus condition watchers, in declaration order.
    pub fn followers_of(&self, name: &str) -> Vec<StepName> {
        followers_of(self.graph, name)
    }

    /// Mark every `Pending` / `Ready` step `Cancelled`, draining the ready
    /// queue. Returns the cancelled steps in declaration order.
    pub fn cancel_unstarted(&mut self) -> Result<Vec<StepName>, TransitionError> {
        self.ready.drain();

        let mut cancelled = Vec::new();
        for step in self.graph.steps() {
            let name = step.name.as_str();
            if matches!(
                self.status_of(name),
                Some(StepStatus::Pending) | Some(StepStatus::Ready)
            ) {
                self.transition(name, StepStatus::Cancelled)?;
                debug!(step = %name, "cancelled before dispatch");
                cancelled.push(step.name.clone());
            }
        }
        Ok(cancelled)
    }
}

/// Direct dependents plus condition watchers, in declaration order.
pub fn followers_of(graph: &DagGraph, name: &str) -> Vec<StepName> {
    let mut out: Vec<StepName> = graph.dependents_of(name).to_vec();
    for watcher in graph.condition_watchers_of(name) {
        if !out.contains(watcher) {
            out.push(watcher.clone());
        }
    }
    out.sort_by_key(|n| graph.index_of(n).unwrap_or(usize::MAX));
    out
}

/// A read-only view for checking dependency satisfaction.
///
/// Used when only shared access to the state map is available (e.g. in
/// `Scheduler::deps_satisfied`).
pub struct ReadOnlyStateManager<'a> {
    graph: &'a DagGraph,
    states: &'a HashMap<StepName, StepExecutionState>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a DagGraph, states: &'a HashMap<StepName, StepExecutionState>) -> Self {
        Self { graph, states }
    }

    /// Canonical readiness rule.
    ///
    /// Only `Completed` satisfies a dependency. A dependency that is terminal
    /// in any other status skips the step right away, even if other
    /// dependencies are still running. Condition references only need to be
    /// terminal.
    pub fn readiness(&self, name: &str) -> Readiness {
        let mut blocked = false;
        let mut skipped_dep: Option<StepName> = None;

        for dep in self.graph.dependencies_of(name) {
            let Some(state) = self.states.get(dep) else {
                warn!(step = %name, dep = %dep, "dependency missing from state map");
                return Readiness::Blocked;
            };

            match state.status {
                StepStatus::Completed => {}
                StepStatus::Failed | StepStatus::Cancelled => {
                    return Readiness::Skip(SkipReason::UpstreamFailed {
                        dependency: dep.clone(),
                    });
                }
                StepStatus::Skipped => {
                    let failure_driven = state
                        .skip_reason
                        .as_ref()
                        .is_some_and(SkipReason::is_failure_driven);
                    if failure_driven {
                        return Readiness::Skip(SkipReason::UpstreamFailed {
                            dependency: dep.clone(),
                        });
                    }
                    if skipped_dep.is_none() {
                        skipped_dep = Some(dep.clone());
                    }
                }
                StepStatus::Pending
                | StepStatus::Ready
                | StepStatus::Running
                | StepStatus::Retrying => blocked = true,
            }
        }

        if let Some(dependency) = skipped_dep {
            return Readiness::Skip(SkipReason::UpstreamSkipped { dependency });
        }
        if blocked {
            return Readiness::Blocked;
        }

        let refs_terminal = self
            .graph
            .condition_refs_of(name)
            .iter()
            .all(|r| self.states.get(r).is_some_and(|s| s.status.is_terminal()));

        if refs_terminal {
            Readiness::Ready
        } else {
            Readiness::Blocked
        }
    }

    /// Whether every dependency of `name` has completed.
    pub fn deps_satisfied(&self, name: &str) -> bool {
        self.graph.dependencies_of(name).iter().all(|dep| {
            self.states
                .get(dep)
                .is_some_and(|s| s.status == StepStatus::Completed)
        })
    }
}
