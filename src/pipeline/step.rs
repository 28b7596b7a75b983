// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Step identities and parallelism policies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::pipeline::Config;
use crate::workers::{Worker, WorkerFactory};

/// Name of a step; the step's identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(Arc<str>);

impl StepName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StepName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether tasks of one step may run for several versions at once
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ParallelismPolicy {
    /// Any number of versions may run this step concurrently
    #[default]
    Parallel,
    /// At most one task of this step is in flight across all versions
    Sequential,
}

impl ParallelismPolicy {
    pub fn is_sequential(self) -> bool {
        matches!(self, Self::Sequential)
    }
}

impl fmt::Display for ParallelismPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parallel => write!(f, "parallel"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

/// A named unit of work applied once per version.
///
/// Steps compare by name only; the worker factory is not part of the identity.
#[derive(Clone)]
pub struct Step {
    name: StepName,
    policy: ParallelismPolicy,
    factory: WorkerFactory,
}

impl Step {
    pub fn new(
        name: impl Into<StepName>,
        policy: ParallelismPolicy,
        factory: WorkerFactory,
    ) -> Self {
        Self {
            name: name.into(),
            policy,
            factory,
        }
    }

    /// Convenience for steps whose worker ignores the config
    pub fn from_worker(
        name: impl Into<StepName>,
        policy: ParallelismPolicy,
        worker: Arc<dyn Worker>,
    ) -> Self {
        Self::new(name, policy, Arc::new(move |_: &Config| Arc::clone(&worker)))
    }

    pub fn name(&self) -> &StepName {
        &self.name
    }

    pub fn policy(&self) -> ParallelismPolicy {
        self.policy
    }

    /// Produce the worker for one version's config
    pub fn worker(&self, config: &Config) -> Arc<dyn Worker> {
        (self.factory)(config)
    }
}

impl PartialEq for Step {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Step {}

impl Hash for Step {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
