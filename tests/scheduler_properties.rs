// tests/scheduler_properties.rs

//! Randomised graphs driven through the pure scheduler.

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::sample::Index;
use stepdag::dag::{DagGraph, Scheduler, StepStatus};
use stepdag::engine::StepRunResult;
use stepdag::errors::StepError;
use stepdag_test_utils::builders::{ProcessBuilder, StepBuilder};

#[derive(Debug, Clone)]
struct StepSpec {
    fails: bool,
    critical: bool,
    deps: Vec<Index>,
}

fn step_spec() -> impl Strategy<Value = StepSpec> {
    (
        prop::bool::weighted(0.25),
        prop::bool::weighted(0.15),
        prop::collection::vec(any::<Index>(), 0..3),
    )
        .prop_map(|(fails, critical, deps)| StepSpec {
            fails,
            critical,
            deps,
        })
}

/// Dependencies only point at earlier steps, so every generated graph is
/// acyclic.
fn build(specs: &[StepSpec]) -> (DagGraph, Vec<BTreeSet<String>>) {
    let mut builder = ProcessBuilder::new("prop");
    let mut deps_by_step = Vec::new();

    for (i, spec) in specs.iter().enumerate() {
        let mut step = StepBuilder::new(&format!("s{i}"));
        let mut deps = BTreeSet::new();
        if i > 0 {
            for ix in &spec.deps {
                deps.insert(format!("s{}", ix.index(i)));
            }
        }
        for dep in &deps {
            step = step.after(dep);
        }
        if spec.critical {
            step = step.critical();
        }
        builder = builder.step(step);
        deps_by_step.push(deps);
    }

    (builder.graph(), deps_by_step)
}

fn result_for(spec: &StepSpec) -> StepRunResult {
    if spec.fails {
        StepRunResult::failed(
            1,
            StepError::Execution {
                code: Some(1),
                stderr: String::new(),
            },
            None,
        )
    } else {
        StepRunResult::completed(1, None)
    }
}

proptest! {
    #[test]
    fn random_graphs_always_terminate_cleanly(
        specs in prop::collection::vec(step_spec(), 1..12),
        limit in 1usize..5,
    ) {
        let (graph, deps_by_step) = build(&specs);
        let mut s = Scheduler::new(graph, limit);

        let mut in_flight: Vec<String> = Vec::new();
        let mut dispatched_total = 0usize;
        let mut step = s.start().unwrap();

        loop {
            if !step.dispatched.is_empty() {
                prop_assert!(!s.is_cancelled(), "dispatch after cancellation");
            }
            for d in &step.dispatched {
                let idx = d.index;
                for dep in &deps_by_step[idx] {
                    prop_assert_eq!(s.status_of(dep), Some(StepStatus::Completed));
                }
                in_flight.push(d.name().to_string());
                dispatched_total += 1;
            }
            prop_assert!(s.in_flight() <= limit);
            prop_assert_eq!(s.in_flight(), in_flight.len());

            if step.run_just_finished || in_flight.is_empty() {
                break;
            }

            let name = in_flight.remove(0);
            let idx: usize = name[1..].parse().unwrap();
            step = s.step_finished(&name, result_for(&specs[idx])).unwrap();
        }

        prop_assert!(s.is_finished());
        prop_assert!(in_flight.is_empty());
        prop_assert!(dispatched_total <= specs.len());

        let states = s.into_states();
        prop_assert_eq!(states.len(), specs.len());
        for (name, state) in &states {
            prop_assert!(state.is_terminal(), "{} ended {}", name, state.status);
        }

        // Anything that depends on a step that did not complete never ran.
        for (i, deps) in deps_by_step.iter().enumerate() {
            let name = format!("s{i}");
            let ran = matches!(states[&name].status, StepStatus::Completed | StepStatus::Failed);
            if ran {
                for dep in deps {
                    prop_assert_eq!(states[dep].status, StepStatus::Completed);
                }
            }
        }
    }
}
