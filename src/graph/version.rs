// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Version graphs
//!
//! The engine only needs to iterate versions in a fixed order and to ask for
//! a version's immediate predecessors. [`DagVersionGraph`] is a plain
//! implementation built from explicit parent lists.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::errors::FlowError;

/// Identifier of an immutable version node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(Arc<str>);

impl VersionId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VersionId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// A DAG of versions, possibly branching and merging
pub trait VersionGraph: Send + Sync {
    /// All versions in a fixed total order
    fn versions(&self) -> Vec<VersionId>;

    /// Immediate predecessors of `version`; empty for a root
    fn predecessors(&self, version: &VersionId) -> Vec<VersionId>;

    fn contains(&self, version: &VersionId) -> bool {
        self.versions().contains(version)
    }
}

/// Version graph backed by a petgraph DAG (edges run parent -> child)
#[derive(Debug, Clone, Default)]
pub struct DagVersionGraph {
    graph: DiGraph<VersionId, ()>,
    index: HashMap<VersionId, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl DagVersionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a version whose parents were all added before it.
    ///
    /// Requiring parents first keeps the insertion order topological.
    pub fn add_version(
        &mut self,
        version: impl Into<VersionId>,
        parents: &[VersionId],
    ) -> Result<(), FlowError> {
        let version = version.into();
        if self.index.contains_key(&version) {
            return Err(FlowError::InvalidDefinition {
                reason: format!("version '{}' is declared more than once", version),
                help: None,
            });
        }

        let mut parent_nodes = Vec::with_capacity(parents.len());
        for parent in parents {
            let node = self
                .index
                .get(parent)
                .ok_or_else(|| FlowError::UnknownVersion {
                    version: parent.to_string(),
                })?;
            parent_nodes.push(*node);
        }

        let node = self.graph.add_node(version.clone());
        for parent in parent_nodes {
            if !self.graph.contains_edge(parent, node) {
                self.graph.add_edge(parent, node, ());
            }
        }
        self.index.insert(version, node);
        self.order.push(node);
        Ok(())
    }

    /// Builder-style [`add_version`](Self::add_version) taking string ids
    pub fn with_version(mut self, version: &str, parents: &[&str]) -> Result<Self, FlowError> {
        let parents: Vec<VersionId> = parents.iter().map(|p| VersionId::from(*p)).collect();
        self.add_version(version, &parents)?;
        Ok(self)
    }

    /// A single linear history in the given order
    pub fn linear<I, S>(versions: I) -> Result<Self, FlowError>
    where
        I: IntoIterator<Item = S>,
        S: Into<VersionId>,
    {
        let mut graph = Self::new();
        let mut previous: Option<VersionId> = None;
        for version in versions {
            let version = version.into();
            let parents: Vec<VersionId> = previous.iter().cloned().collect();
            graph.add_version(version.clone(), &parents)?;
            previous = Some(version);
        }
        Ok(graph)
    }

    /// Immediate successors of `version`
    pub fn successors(&self, version: &VersionId) -> Vec<VersionId> {
        self.neighbors(version, Direction::Outgoing)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn neighbors(&self, version: &VersionId, direction: Direction) -> Vec<VersionId> {
        let Some(node) = self.index.get(version) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeIndex> = self.graph.neighbors_directed(*node, direction).collect();
        nodes.sort();
        nodes.into_iter().map(|n| self.graph[n].clone()).collect()
    }
}

impl VersionGraph for DagVersionGraph {
    fn versions(&self) -> Vec<VersionId> {
        self.order.iter().map(|n| self.graph[*n].clone()).collect()
    }

    fn predecessors(&self, version: &VersionId) -> Vec<VersionId> {
        self.neighbors(version, Direction::Incoming)
    }

    fn contains(&self, version: &VersionId) -> bool {
        self.index.contains_key(version)
    }
}

/// Version graph file (YAML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionGraphFile {
    /// Versions in iteration order; parents must come first
    pub versions: Vec<VersionEntry>,
}

/// One version and its immediate parents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: VersionId,

    #[serde(default)]
    pub parents: Vec<VersionId>,
}

impl VersionGraphFile {
    /// Load a version graph file from disk
    pub fn from_file(path: &Path) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path).map_err(|e| FlowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, FlowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    pub fn into_graph(self) -> Result<DagVersionGraph, FlowError> {
        let mut graph = DagVersionGraph::new();
        for entry in self.versions {
            graph.add_version(entry.id, &entry.parents)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(versions: &[&str]) -> Vec<VersionId> {
        versions.iter().map(|v| VersionId::from(*v)).collect()
    }

    #[test]
    fn test_branching_graph() {
        let graph = DagVersionGraph::new()
            .with_version("1", &[])
            .unwrap()
            .with_version("2", &["1"])
            .unwrap()
            .with_version("3", &["2"])
            .unwrap()
            .with_version("4", &["2"])
            .unwrap();

        assert_eq!(graph.versions(), ids(&["1", "2", "3", "4"]));
        assert!(graph.predecessors(&"1".into()).is_empty());
        assert_eq!(graph.predecessors(&"4".into()), ids(&["2"]));
        assert_eq!(graph.successors(&"2".into()), ids(&["3", "4"]));
    }

    #[test]
    fn test_merge_version_has_all_parents() {
        let graph = DagVersionGraph::new()
            .with_version("a", &[])
            .unwrap()
            .with_version("b", &["a"])
            .unwrap()
            .with_version("c", &["a"])
            .unwrap()
            .with_version("m", &["b", "c"])
            .unwrap();

        assert_eq!(graph.predecessors(&"m".into()), ids(&["b", "c"]));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let result = DagVersionGraph::new().with_version("2", &["1"]);
        assert!(matches!(result, Err(FlowError::UnknownVersion { .. })));
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let result = DagVersionGraph::linear(["1", "1"]);
        assert!(matches!(result, Err(FlowError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_parse_graph_file() {
        let yaml = r#"
versions:
  - id: "1.0"
  - id: "1.1"
    parents: ["1.0"]
  - id: "1.1-snapshot"
    parents: ["1.0"]
"#;

        let graph = VersionGraphFile::from_yaml(yaml).unwrap().into_graph().unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.predecessors(&"1.1-snapshot".into()), ids(&["1.0"]));
    }
}
