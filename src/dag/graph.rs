// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::step::{ProcessDefinition, StepDefinition, StepName};
use crate::errors::{Result, StepdagError};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Declaration index of the step.
    index: usize,
    /// Direct dependencies: steps that must complete before this one can run.
    deps: Vec<StepName>,
    /// Direct dependents: steps that depend on this one.
    dependents: Vec<StepName>,
    /// Steps this one's condition looks at (ordering only, no skip cascade).
    condition_refs: Vec<StepName>,
    /// Steps whose condition looks at this one.
    condition_watchers: Vec<StepName>,
}

/// Validated, acyclic step graph keyed by step name.
///
/// Owns the step definitions (in declaration order) plus forward and reverse
/// adjacency, so "are all my dependencies done?" and "who depends on me?" are
/// both direct lookups.
#[derive(Debug, Clone)]
pub struct DagGraph {
    steps: Vec<StepDefinition>,
    nodes: HashMap<StepName, DagNode>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DagGraph {
    /// Validate a list of steps into a graph.
    ///
    /// Rejects, in this order:
    /// - duplicate step names,
    /// - dependencies (or condition references) naming unknown steps,
    /// - cycles, reported with the offending path (`A -> B -> A`).
    pub fn build(steps: Vec<StepDefinition>) -> Result<Self> {
        let mut nodes: HashMap<StepName, DagNode> = HashMap::with_capacity(steps.len());

        // First pass: create nodes, rejecting duplicates.
        for (index, step) in steps.iter().enumerate() {
            if nodes.contains_key(&step.name) {
                return Err(StepdagError::DuplicateStep(step.name.clone()));
            }

            let mut deps: Vec<StepName> = Vec::with_capacity(step.dependencies.len());
            for dep in &step.dependencies {
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }

            nodes.insert(
                step.name.clone(),
                DagNode {
                    index,
                    deps,
                    condition_refs: step.condition_refs(),
                    ..DagNode::default()
                },
            );
        }

        // Second pass: check references and populate reverse edges.
        for step in &steps {
            let (deps, refs) = match nodes.get(&step.name) {
                Some(node) => (node.deps.clone(), node.condition_refs.clone()),
                None => continue,
            };

            for dep in deps {
                match nodes.get_mut(&dep) {
                    Some(dep_node) => dep_node.dependents.push(step.name.clone()),
                    None => {
                        return Err(StepdagError::UnknownDependency {
                            step: step.name.clone(),
                            dependency: dep,
                        });
                    }
                }
            }

            for target in refs {
                match nodes.get_mut(&target) {
                    Some(target_node) => target_node.condition_watchers.push(step.name.clone()),
                    None => {
                        return Err(StepdagError::UnknownDependency {
                            step: step.name.clone(),
                            dependency: target,
                        });
                    }
                }
            }
        }

        let graph = Self { steps, nodes };
        graph.check_acyclic()?;

        debug!(steps = graph.len(), "step graph validated");
        Ok(graph)
    }

    /// Convenience wrapper over [`DagGraph::build`] for a whole process.
    pub fn from_process(process: &ProcessDefinition) -> Result<Self> {
        Self::build(process.steps.clone())
    }

    /// Three-colour depth-first search over prerequisite edges.
    fn check_acyclic(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = self
            .steps
            .iter()
            .map(|s| (s.name.as_str(), Mark::Unvisited))
            .collect();
        let mut path: Vec<&str> = Vec::new();

        for step in &self.steps {
            if marks.get(step.name.as_str()) == Some(&Mark::Unvisited) {
                if let Some(cycle) = self.visit(&step.name, &mut marks, &mut path) {
                    return Err(StepdagError::CyclicDependency(cycle.join(" -> ")));
                }
            }
        }

        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        marks.insert(name, Mark::InProgress);
        path.push(name);

        for next in self.prerequisites_of(name) {
            match marks.get(next.as_str()).copied().unwrap_or(Mark::Done) {
                Mark::InProgress => {
                    // Back-edge: the cycle is the path from `next` onward.
                    let start = path.iter().position(|n| *n == next.as_str()).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.clone());
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = self.visit(next, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }

        path.pop();
        marks.insert(name, Mark::Done);
        None
    }

    /// Dependencies followed by condition references, without duplicates.
    fn prerequisites_of(&self, name: &str) -> impl Iterator<Item = &StepName> {
        let node = self.nodes.get(name);
        let deps = node.map(|n| n.deps.as_slice()).unwrap_or(&[]);
        let refs = node.map(|n| n.condition_refs.as_slice()).unwrap_or(&[]);
        deps.iter()
            .chain(refs.iter().filter(move |r| !deps.contains(*r)))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step definitions in declaration order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.index_of(name).map(|i| &self.steps[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Declaration index of a step.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|n| n.index)
    }

    /// Return all step names in declaration order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    /// Immediate dependencies of a step.
    pub fn dependencies_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a step (steps that list this one as a dependency).
    pub fn dependents_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Steps referenced by this step's condition.
    pub fn condition_refs_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.condition_refs.as_slice())
            .unwrap_or(&[])
    }

    /// Steps whose condition references this step.
    pub fn condition_watchers_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.condition_watchers.as_slice())
            .unwrap_or(&[])
    }

    /// Steps in an order where every prerequisite precedes its dependents.
    pub fn topological_order(&self) -> Vec<StepName> {
        // Edge direction: prerequisite -> step.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for step in &self.steps {
            graph.add_node(step.name.as_str());
        }
        for step in &self.steps {
            for pre in self.prerequisites_of(&step.name) {
                graph.add_edge(pre.as_str(), step.name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(str::to_string).collect(),
            Err(cycle) => {
                // Unreachable for a graph produced by `build`.
                warn!(node = %cycle.node_id(), "topological sort hit a cycle; using declaration order");
                self.step_names().map(str::to_string).collect()
            }
        }
    }

    /// Group steps into waves of maximal parallelism.
    ///
    /// Wave `n` contains the steps whose longest prerequisite chain has
    /// length `n`; every step in a wave can run concurrently once the
    /// previous waves are done. Steps within a wave keep declaration order.
    pub fn execution_waves(&self) -> Vec<Vec<StepName>> {
        let order = self.topological_order();
        let mut level: HashMap<&str, usize> = HashMap::with_capacity(self.len());

        for name in &order {
            let lvl = self
                .prerequisites_of(name)
                .filter_map(|p| level.get(p.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(name.as_str(), lvl);
        }

        let depth = level.values().copied().max().map(|m| m + 1).unwrap_or(0);
        let mut waves: Vec<Vec<StepName>> = vec![Vec::new(); depth];
        for step in &self.steps {
            if let Some(lvl) = level.get(step.name.as_str()) {
                waves[*lvl].push(step.name.clone());
            }
        }
        waves
    }

    /// All steps transitively downstream of `name` via hard dependencies.
    pub fn transitive_dependents(&self, name: &str) -> HashSet<StepName> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(current) = stack.pop() {
            for dep in self.dependents_of(current) {
                if seen.insert(dep.clone()) {
                    stack.push(dep.as_str());
                }
            }
        }
        seen
    }
}
