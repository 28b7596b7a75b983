// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Execution graph builder
//!
//! Expands a pipeline description over a version graph into one task per
//! (step, version) pair. Edges point from a task to the tasks that must be
//! completed before it may start.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::errors::FlowError;
use crate::graph::{VersionGraph, VersionId};
use crate::pipeline::{PipelineDescription, StepName};

/// A step applied to one version; the unit of scheduling
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Task {
    pub step: StepName,
    pub version: VersionId,
}

impl Task {
    pub fn new(step: impl Into<StepName>, version: impl Into<VersionId>) -> Self {
        Self {
            step: step.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.step, self.version)
    }
}

/// Immutable task graph for one run
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    graph: DiGraph<Task, ()>,
    index: HashMap<Task, NodeIndex>,
}

impl ExecutionGraph {
    /// Build the task graph for `description` over `versions`
    pub fn build(
        description: &PipelineDescription,
        versions: &dyn VersionGraph,
    ) -> Result<Self, FlowError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let order = versions.versions();

        // One vertex per (step, version), version-major
        for version in &order {
            for step in description.steps() {
                let task = Task::new(step.name().clone(), version.clone());
                let node = graph.add_node(task.clone());
                index.insert(task, node);
            }
        }

        let mut built = Self { graph, index };

        for version in &order {
            let predecessors = versions.predecessors(version);

            for step in description.steps() {
                let task = Task::new(step.name().clone(), version.clone());
                let node = built.index[&task];

                // Inter-version: fan out over every immediate predecessor
                for dependency in description.inter_dependencies(step.name()) {
                    if !description.contains(&dependency) {
                        continue;
                    }
                    for predecessor in &predecessors {
                        let prerequisite = Task::new(dependency.clone(), predecessor.clone());
                        let prerequisite_node = built.node(&prerequisite).ok_or_else(|| {
                            FlowError::UnknownVersion {
                                version: predecessor.to_string(),
                            }
                        })?;
                        built.add_edge(node, prerequisite_node);
                    }
                }

                // Intra-version
                for dependency in description.intra_dependencies(step.name()) {
                    if let Some(prerequisite_node) =
                        built.node(&Task::new(dependency, version.clone()))
                    {
                        built.add_edge(node, prerequisite_node);
                    }
                }
            }
        }

        built.validate_acyclic()?;
        Ok(built)
    }

    fn add_edge(&mut self, task: NodeIndex, prerequisite: NodeIndex) {
        if !self.graph.contains_edge(task, prerequisite) {
            self.graph.add_edge(task, prerequisite, ());
        }
    }

    /// Validate that the graph is acyclic
    fn validate_acyclic(&self) -> Result<(), FlowError> {
        toposort(&self.graph, None).map(|_| ()).map_err(|cycle| {
            let start = cycle.node_id();
            let mut tasks = vec![self.graph[start].to_string()];
            tasks.extend(
                self.graph
                    .neighbors_directed(start, Direction::Outgoing)
                    .map(|n| self.graph[n].to_string()),
            );
            FlowError::CircularDependency { tasks }
        })
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Tasks in build order (version-major, then step order)
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_indices().map(|n| &self.graph[n])
    }

    pub fn contains(&self, task: &Task) -> bool {
        self.index.contains_key(task)
    }

    /// Tasks that must be completed before `task` may start
    pub fn prerequisites(&self, task: &Task) -> Vec<Task> {
        self.related(task, Direction::Outgoing)
    }

    /// Tasks that wait for `task`
    pub fn dependents(&self, task: &Task) -> Vec<Task> {
        self.related(task, Direction::Incoming)
    }

    /// Prerequisites in topological order (prerequisites first)
    pub fn topological_order(&self) -> Result<Vec<Task>, FlowError> {
        let mut order: Vec<Task> = toposort(&self.graph, None)
            .map_err(|cycle| FlowError::CircularDependency {
                tasks: vec![self.graph[cycle.node_id()].to_string()],
            })?
            .into_iter()
            .map(|n| self.graph[n].clone())
            .collect();
        // Edges point at prerequisites, so petgraph yields dependents first
        order.reverse();
        Ok(order)
    }

    pub(crate) fn node(&self, task: &Task) -> Option<NodeIndex> {
        self.index.get(task).copied()
    }

    pub(crate) fn task_at(&self, node: NodeIndex) -> &Task {
        &self.graph[node]
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub(crate) fn prerequisite_nodes(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub(crate) fn dependent_nodes(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Incoming)
    }

    fn related(&self, task: &Task, direction: Direction) -> Vec<Task> {
        let Some(node) = self.node(task) else {
            return Vec::new();
        };
        let mut related: Vec<Task> = self
            .graph
            .neighbors_directed(node, direction)
            .map(|n| self.graph[n].clone())
            .collect();
        related.sort();
        related
    }

    /// Generate text representation of execution order
    pub fn to_text(&self) -> Result<String, FlowError> {
        let mut out = String::new();

        for (i, task) in self.topological_order()?.iter().enumerate() {
            out.push_str(&format!("{}. {}", i + 1, task));

            let prerequisites = self.prerequisites(task);
            if !prerequisites.is_empty() {
                let names: Vec<String> = prerequisites.iter().map(Task::to_string).collect();
                out.push_str(&format!(" [after: {}]", names.join(", ")));
            }

            out.push('\n');
        }

        Ok(out)
    }

    /// Generate JSON listing of tasks in execution order with their prerequisites
    pub fn to_json(&self) -> Result<String, FlowError> {
        #[derive(Serialize)]
        struct Entry<'a> {
            #[serde(flatten)]
            task: &'a Task,
            after: Vec<Task>,
        }

        let order = self.topological_order()?;
        let entries: Vec<Entry<'_>> = order
            .iter()
            .map(|task| Entry {
                task,
                after: self.prerequisites(task),
            })
            .collect();

        Ok(serde_json::to_string_pretty(&entries)?)
    }

    /// Generate DOT diagram of the graph (arrows run prerequisite -> task)
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph execution {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for node in self.graph.node_indices() {
            out.push_str(&format!("    \"{}\";\n", self.graph[node]));
        }

        for edge in self.graph.edge_indices() {
            if let Some((task, prerequisite)) = self.graph.edge_endpoints(edge) {
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\";\n",
                    self.graph[prerequisite], self.graph[task]
                ));
            }
        }

        out.push_str("}\n");
        out
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for node in self.graph.node_indices() {
            out.push_str(&format!("    t{}[\"{}\"]\n", node.index(), self.graph[node]));
        }

        for edge in self.graph.edge_indices() {
            if let Some((task, prerequisite)) = self.graph.edge_endpoints(edge) {
                out.push_str(&format!(
                    "    t{} --> t{}\n",
                    prerequisite.index(),
                    task.index()
                ));
            }
        }

        out
    }
}
