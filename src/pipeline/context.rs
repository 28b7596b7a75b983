// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Per-version context and config handed to workers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::runtime::Handle;

use crate::graph::VersionId;

/// Runtime context for one version
#[derive(Debug, Clone)]
pub struct Context {
    version: VersionId,
    predecessors: Vec<VersionId>,
    executor: Handle,
}

impl Context {
    /// Build a context bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime. Use [`Context::with_executor`]
    /// to pass a handle explicitly.
    pub fn new(version: VersionId, predecessors: Vec<VersionId>) -> Self {
        Self::with_executor(version, predecessors, Handle::current())
    }

    pub fn with_executor(version: VersionId, predecessors: Vec<VersionId>, executor: Handle) -> Self {
        Self {
            version,
            predecessors,
            executor,
        }
    }

    /// The version this context targets
    pub fn version(&self) -> &VersionId {
        &self.version
    }

    /// Immediate predecessors of the version; empty for a root
    pub fn predecessors(&self) -> &[VersionId] {
        &self.predecessors
    }

    /// Runtime handle workers may use to spawn their own work
    pub fn executor(&self) -> &Handle {
        &self.executor
    }
}

/// Per-version settings, a flat string map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Overlay `other` on top of this config
    pub fn overlay(mut self, other: &Config) -> Self {
        self.values
            .extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for Config {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_prefers_other() {
        let base = Config::new().with("JAVA", "17").with("MAPPINGS", "official");
        let version = Config::new().with("JAVA", "8");

        let merged = base.overlay(&version);
        assert_eq!(merged.get("JAVA"), Some("8"));
        assert_eq!(merged.get("MAPPINGS"), Some("official"));
    }

    #[tokio::test]
    async fn test_context_exposes_version() {
        let ctx = Context::new(VersionId::from("1.2"), vec![VersionId::from("1.1")]);
        assert_eq!(ctx.version().as_str(), "1.2");
        assert_eq!(ctx.predecessors().len(), 1);
    }

    #[test]
    #[should_panic(expected = "runtime")]
    fn test_new_outside_runtime_panics() {
        Context::new(VersionId::from("1.2"), vec![]);
    }

    #[test]
    fn test_with_executor_outside_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let ctx = Context::with_executor(VersionId::from("1.2"), vec![], runtime.handle().clone());
        assert_eq!(ctx.version().as_str(), "1.2");
        assert!(ctx.predecessors().is_empty());
    }
}
