// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Step workers
//!
//! The engine only knows the [`Worker`] capability; what a worker actually
//! does (fetching, transforming, committing) is up to the implementation.

mod shell;

pub use shell::ShellWorker;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{ArtifactResolver, PipelineHandle};
use crate::pipeline::{Config, Context, StepOutput, StepResults, StorageKey};

/// Produces a step's worker from a version's config
pub type WorkerFactory = Arc<dyn Fn(&Config) -> Arc<dyn Worker> + Send + Sync>;

/// Trait for step workers
#[async_trait]
pub trait Worker: Send + Sync {
    /// Whether the step has anything to do for this version.
    ///
    /// Returning `false` completes the task as not run without calling
    /// [`run`](Self::run).
    async fn should_execute(
        &self,
        _pipeline: &PipelineHandle,
        _context: &Context,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Run the step for one version
    ///
    /// # Arguments
    /// * `pipeline` - Handle to storage, the version graph and the repository
    /// * `context` - The version's context
    /// * `input` - The step's wired input
    /// * `results` - Artifacts accumulated for the version so far
    async fn run(
        &self,
        pipeline: &PipelineHandle,
        context: &Context,
        input: StepInput,
        results: Arc<StepResults>,
    ) -> anyhow::Result<StepOutput>;
}

/// Typed input handed to a worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StepInput {
    /// The step takes no input
    #[default]
    Empty,
    /// Resolved artifact locations by key
    Artifacts(BTreeMap<StorageKey, PathBuf>),
}

impl StepInput {
    /// Every artifact accumulated so far, resolved to its path
    pub fn all_artifacts(resolver: &ArtifactResolver<'_>, results: &StepResults) -> Self {
        Self::artifacts(resolver, results.keys())
    }

    /// The given keys, resolved to their paths
    pub fn artifacts(
        resolver: &ArtifactResolver<'_>,
        keys: impl IntoIterator<Item = StorageKey>,
    ) -> Self {
        let artifacts: BTreeMap<_, _> = keys
            .into_iter()
            .map(|key| {
                let path = resolver.resolve(&key);
                (key, path)
            })
            .collect();

        if artifacts.is_empty() {
            Self::Empty
        } else {
            Self::Artifacts(artifacts)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Artifacts(artifacts) => artifacts.is_empty(),
        }
    }

    pub fn get(&self, key: &StorageKey) -> Option<&Path> {
        match self {
            Self::Empty => None,
            Self::Artifacts(artifacts) => artifacts.get(key).map(PathBuf::as_path),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (&StorageKey, &Path)> + '_> {
        match self {
            Self::Empty => Box::new(std::iter::empty()),
            Self::Artifacts(artifacts) => {
                Box::new(artifacts.iter().map(|(k, v)| (k, v.as_path())))
            }
        }
    }
}

/// Worker that succeeds without doing anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopWorker;

#[async_trait]
impl Worker for NoopWorker {
    async fn run(
        &self,
        _pipeline: &PipelineHandle,
        _context: &Context,
        _input: StepInput,
        results: Arc<StepResults>,
    ) -> anyhow::Result<StepOutput> {
        Ok(StepOutput::success(results))
    }
}
