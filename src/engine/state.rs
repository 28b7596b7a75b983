// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Mutable per-run scheduler state
//!
//! Every transition here happens under the scheduler's single state lock.
//! Readiness is tracked incrementally: each task keeps a count of
//! prerequisites that have not completed yet and enters the ready pool when
//! that count reaches zero.

use petgraph::graph::NodeIndex;
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::graph::ExecutionGraph;
use crate::pipeline::StepName;

/// Where a run stands, as seen by the waiting driver
#[derive(Debug)]
pub(crate) enum Progress {
    /// Work is still pending or in flight
    Running,
    /// Every task completed
    Finished,
    /// At least one task failed and in-flight work has drained
    Failed(Vec<(NodeIndex, anyhow::Error)>),
    /// Nothing in flight, nothing dispatchable, not finished
    Stalled { pending: usize },
}

#[derive(Debug)]
pub(crate) struct RunState {
    completed: HashSet<NodeIndex>,
    executing: HashSet<NodeIndex>,
    active_sequential: HashSet<StepName>,
    /// In the order the failures were recorded
    failures: Vec<(NodeIndex, anyhow::Error)>,
    remaining: HashMap<NodeIndex, usize>,
    ready: BTreeSet<NodeIndex>,
    sequential_steps: HashSet<StepName>,
    accepting: bool,
    total: usize,
}

impl RunState {
    pub(crate) fn new(graph: &ExecutionGraph, sequential_steps: HashSet<StepName>) -> Self {
        let mut remaining = HashMap::new();
        let mut ready = BTreeSet::new();

        for node in graph.nodes() {
            let count = graph.prerequisite_nodes(node).count();
            if count == 0 {
                ready.insert(node);
            }
            remaining.insert(node, count);
        }

        Self {
            completed: HashSet::new(),
            executing: HashSet::new(),
            active_sequential: HashSet::new(),
            failures: Vec::new(),
            remaining,
            ready,
            sequential_steps,
            accepting: true,
            total: graph.task_count(),
        }
    }

    /// Move every dispatchable ready task to executing and return it.
    ///
    /// Tasks of a sequential step stay in the pool while another task of
    /// that step is executing.
    pub(crate) fn claim_ready(&mut self, graph: &ExecutionGraph) -> Vec<NodeIndex> {
        if !self.accepting {
            return Vec::new();
        }

        let mut claimed = Vec::new();
        let candidates: Vec<NodeIndex> = self.ready.iter().copied().collect();

        for node in candidates {
            if self.executing.contains(&node) || self.completed.contains(&node) {
                self.ready.remove(&node);
                continue;
            }

            let step = &graph.task_at(node).step;
            if self.sequential_steps.contains(step) {
                if self.active_sequential.contains(step) {
                    continue;
                }
                self.active_sequential.insert(step.clone());
            }

            self.ready.remove(&node);
            self.executing.insert(node);
            debug!(task = %graph.task_at(node), "Dispatching");
            claimed.push(node);
        }

        claimed
    }

    /// Record a successful task and release its dependents
    pub(crate) fn complete(&mut self, node: NodeIndex, graph: &ExecutionGraph) {
        if !self.executing.remove(&node) || !self.completed.insert(node) {
            return;
        }
        self.release_sequential(node, graph);

        for dependent in graph.dependent_nodes(node) {
            if let Some(count) = self.remaining.get_mut(&dependent) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.ready.insert(dependent);
                }
            }
        }
    }

    /// Record a failed task and stop accepting new dispatches
    pub(crate) fn fail(&mut self, node: NodeIndex, graph: &ExecutionGraph, error: anyhow::Error) {
        if !self.executing.remove(&node) {
            return;
        }
        self.release_sequential(node, graph);
        self.failures.push((node, error));
        if self.accepting {
            debug!(task = %graph.task_at(node), "Stopping dispatch after failure");
        }
        self.accepting = false;
    }

    fn release_sequential(&mut self, node: NodeIndex, graph: &ExecutionGraph) {
        let step = &graph.task_at(node).step;
        if self.sequential_steps.contains(step) {
            self.active_sequential.remove(step);
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.completed.len() == self.total
    }

    pub(crate) fn is_completed(&self, node: NodeIndex) -> bool {
        self.completed.contains(&node)
    }

    pub(crate) fn executing_count(&self) -> usize {
        self.executing.len()
    }

    /// Evaluate both exit conditions
    pub(crate) fn progress(&mut self) -> Progress {
        if self.is_finished() {
            return Progress::Finished;
        }

        if !self.failures.is_empty() {
            if !self.executing.is_empty() {
                return Progress::Running;
            }
            return Progress::Failed(std::mem::take(&mut self.failures));
        }

        if self.executing.is_empty() {
            return Progress::Stalled {
                pending: self.total - self.completed.len(),
            };
        }

        Progress::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DagVersionGraph, Task};
    use crate::pipeline::{ParallelismPolicy, PipelineDescription, Step, StepDependencies};
    use crate::workers::NoopWorker;
    use std::sync::Arc;

    fn graph(policy: ParallelismPolicy) -> ExecutionGraph {
        let description = PipelineDescription::builder("test")
            .step(Step::from_worker("fetch", ParallelismPolicy::Parallel, Arc::new(NoopWorker)))
            .step_with(
                Step::from_worker("commit", policy, Arc::new(NoopWorker)),
                StepDependencies::new().requires("fetch"),
            )
            .build()
            .unwrap();
        let versions = DagVersionGraph::new()
            .with_version("1", &[])
            .unwrap()
            .with_version("2", &[])
            .unwrap();
        ExecutionGraph::build(&description, &versions).unwrap()
    }

    fn tasks(graph: &ExecutionGraph, nodes: &[NodeIndex]) -> Vec<Task> {
        nodes.iter().map(|n| graph.task_at(*n).clone()).collect()
    }

    #[test]
    fn test_roots_are_ready_first() {
        let graph = graph(ParallelismPolicy::Parallel);
        let mut state = RunState::new(&graph, HashSet::new());

        let claimed = state.claim_ready(&graph);
        assert_eq!(
            tasks(&graph, &claimed),
            vec![Task::new("fetch", "1"), Task::new("fetch", "2")]
        );
        assert!(state.claim_ready(&graph).is_empty());
        assert!(matches!(state.progress(), Progress::Running));
    }

    #[test]
    fn test_completion_releases_dependents() {
        let graph = graph(ParallelismPolicy::Parallel);
        let mut state = RunState::new(&graph, HashSet::new());

        let roots = state.claim_ready(&graph);
        for node in &roots {
            state.complete(*node, &graph);
        }
        let next = state.claim_ready(&graph);
        assert_eq!(
            tasks(&graph, &next),
            vec![Task::new("commit", "1"), Task::new("commit", "2")]
        );

        for node in next {
            state.complete(node, &graph);
        }
        assert!(state.is_finished());
        assert!(matches!(state.progress(), Progress::Finished));
    }

    #[test]
    fn test_sequential_step_claims_one_at_a_time() {
        let graph = graph(ParallelismPolicy::Sequential);
        let mut state = RunState::new(&graph, HashSet::from([StepName::from("commit")]));

        for node in state.claim_ready(&graph) {
            state.complete(node, &graph);
        }

        let first = state.claim_ready(&graph);
        assert_eq!(tasks(&graph, &first), vec![Task::new("commit", "1")]);
        assert!(state.claim_ready(&graph).is_empty());

        state.complete(first[0], &graph);
        let second = state.claim_ready(&graph);
        assert_eq!(tasks(&graph, &second), vec![Task::new("commit", "2")]);
    }

    #[test]
    fn test_failure_waits_for_in_flight_work() {
        let graph = graph(ParallelismPolicy::Parallel);
        let mut state = RunState::new(&graph, HashSet::new());

        let roots = state.claim_ready(&graph);
        state.fail(roots[0], &graph, anyhow::anyhow!("boom"));

        assert!(matches!(state.progress(), Progress::Running));
        assert_eq!(state.executing_count(), 1);

        state.complete(roots[1], &graph);
        // No new dispatch after a failure
        assert!(state.claim_ready(&graph).is_empty());

        match state.progress() {
            Progress::Failed(failures) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(graph.task_at(failures[0].0), &Task::new("fetch", "1"));
            }
            other => panic!("unexpected progress: {:?}", other),
        }
        assert!(state.is_completed(roots[1]));
    }

    #[test]
    fn test_failures_are_reported_in_completion_order() {
        let graph = graph(ParallelismPolicy::Parallel);
        let mut state = RunState::new(&graph, HashSet::new());

        let roots = state.claim_ready(&graph);
        state.fail(roots[1], &graph, anyhow::anyhow!("second version"));
        state.fail(roots[0], &graph, anyhow::anyhow!("first version"));
        state.fail(roots[0], &graph, anyhow::anyhow!("reported twice"));

        match state.progress() {
            Progress::Failed(failures) => {
                let reported: Vec<(Task, String)> = failures
                    .iter()
                    .map(|(node, error)| (graph.task_at(*node).clone(), error.to_string()))
                    .collect();
                assert_eq!(
                    reported,
                    vec![
                        (Task::new("fetch", "2"), "second version".to_string()),
                        (Task::new("fetch", "1"), "first version".to_string()),
                    ]
                );
            }
            other => panic!("unexpected progress: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_completion_is_ignored() {
        let graph = graph(ParallelismPolicy::Parallel);
        let mut state = RunState::new(&graph, HashSet::new());

        let roots = state.claim_ready(&graph);
        state.complete(roots[0], &graph);
        state.complete(roots[0], &graph);
        state.complete(roots[1], &graph);

        assert_eq!(state.claim_ready(&graph).len(), 2);
    }
}
