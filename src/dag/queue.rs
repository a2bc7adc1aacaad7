// src/dag/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::dag::StepName;

/// FIFO of steps that are `Ready` but waiting for a free concurrency slot.
///
/// Semantics:
/// - Steps are served in the order they became ready.
/// - Steps that become ready in the same scheduler step form one *batch*;
///   a batch is enqueued in declaration order, so ties are deterministic.
/// - A step can be queued at most once.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    queue: VecDeque<StepName>,
    queued: HashSet<StepName>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no step is waiting for a slot.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Enqueue a batch of steps that became ready together.
    ///
    /// `batch` holds `(declaration_index, name)` pairs; it is sorted by index
    /// before being appended.
    pub fn push_batch(&mut self, mut batch: Vec<(usize, StepName)>) {
        batch.sort_by_key(|(index, _)| *index);

        for (_, name) in batch {
            if !self.queued.insert(name.clone()) {
                warn!(step = %name, "step already queued as ready; ignoring duplicate");
                continue;
            }
            debug!(step = %name, position = self.queue.len(), "step queued as ready");
            self.queue.push_back(name);
        }
    }

    /// Take the next step to dispatch.
    pub fn pop(&mut self) -> Option<StepName> {
        let name = self.queue.pop_front()?;
        self.queued.remove(&name);
        Some(name)
    }

    /// Remove and return every queued step (used on cancellation).
    pub fn drain(&mut self) -> Vec<StepName> {
        self.queued.clear();
        let steps: Vec<StepName> = self.queue.drain(..).collect();
        debug!(drained = steps.len(), "drained ready queue");
        steps
    }
}
