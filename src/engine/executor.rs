// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Pipeline driver
//!
//! Runs a pipeline description over a version graph: builds the execution
//! graph, hands it to the [`Scheduler`] and executes each task's worker with
//! the version's memoized context and config.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::engine::scheduler::{Scheduler, TaskRunner};
use crate::engine::storage::{PathOverrides, StorageLayout};
use crate::errors::FlowResult;
use crate::graph::{ExecutionGraph, Task, VersionGraph, VersionId};
use crate::pipeline::{Config, Context, PipelineDescription, StepResults, StepStatus, StorageKey};

/// Pipeline execution options
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Maximum number of worker bodies running at once; `None` is unlimited
    pub max_parallelism: Option<usize>,
    /// Build the execution graph without running anything
    pub dry_run: bool,
}

/// Opaque handle to the repository workers write into
#[derive(Debug, Clone, Default)]
pub struct RepositoryHandle {
    path: Option<PathBuf>,
}

impl RepositoryHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A handle for runs that do not write to a repository
    pub fn none() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Hook for rendering run progress
pub trait TaskObserver: Send + Sync {
    fn task_started(&self, _task: &Task) {}

    fn task_finished(&self, _task: &Task, _status: StepStatus, _duration: Duration) {}
}

/// Result of executing a pipeline
#[derive(Debug, Default)]
pub struct PipelineResult {
    /// Artifacts accumulated per version
    pub results: BTreeMap<VersionId, Vec<StorageKey>>,
    /// Outcome of each task
    pub statuses: BTreeMap<Task, StepStatus>,
    /// Total execution time
    pub duration: Duration,
}

impl PipelineResult {
    /// Merged status of every task
    pub fn status(&self) -> StepStatus {
        StepStatus::merge(self.statuses.values().copied())
    }

    pub fn status_of(&self, task: &Task) -> Option<StepStatus> {
        self.statuses.get(task).copied()
    }

    pub fn results_for(&self, version: &VersionId) -> &[StorageKey] {
        self.results.get(version).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tasks with the given status
    pub fn count(&self, status: StepStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }
}

/// What workers see of the running pipeline.
///
/// Contexts and configs are created once per version and reused for the
/// rest of the run.
pub struct PipelineHandle {
    description: Arc<PipelineDescription>,
    versions: Arc<dyn VersionGraph>,
    storage: Arc<dyn StorageLayout>,
    repository: RepositoryHandle,
    overrides: PathOverrides,
    contexts: Mutex<HashMap<VersionId, Arc<Context>>>,
    configs: Mutex<HashMap<VersionId, Arc<Config>>>,
    results: Mutex<HashMap<VersionId, Arc<StepResults>>>,
}

impl PipelineHandle {
    pub fn new(
        description: Arc<PipelineDescription>,
        versions: Arc<dyn VersionGraph>,
        storage: Arc<dyn StorageLayout>,
        repository: RepositoryHandle,
    ) -> Self {
        Self {
            description,
            versions,
            storage,
            repository,
            overrides: PathOverrides::new(),
            contexts: Mutex::new(HashMap::new()),
            configs: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_overrides(mut self, overrides: PathOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn description(&self) -> &PipelineDescription {
        &self.description
    }

    pub fn versions(&self) -> &dyn VersionGraph {
        self.versions.as_ref()
    }

    pub fn repository(&self) -> &RepositoryHandle {
        &self.repository
    }

    pub fn overrides(&self) -> &PathOverrides {
        &self.overrides
    }

    pub fn context(&self, version: &VersionId) -> Arc<Context> {
        let mut contexts = self.contexts.lock();
        let context = contexts.entry(version.clone()).or_insert_with(|| {
            Arc::new(
                self.description
                    .create_context(version, self.versions.as_ref()),
            )
        });
        Arc::clone(context)
    }

    pub fn config(&self, version: &VersionId) -> Arc<Config> {
        let mut configs = self.configs.lock();
        let config = configs
            .entry(version.clone())
            .or_insert_with(|| Arc::new(self.description.create_config(version)));
        Arc::clone(config)
    }

    /// Artifacts accumulated for `version` so far
    pub fn results(&self, version: &VersionId) -> Arc<StepResults> {
        let mut results = self.results.lock();
        Arc::clone(results.entry(version.clone()).or_default())
    }

    /// Storage path of `key` for `version`, following overrides
    pub fn path(&self, version: &VersionId, key: &StorageKey) -> PathBuf {
        let source = self.overrides.resolve(version, key);
        if &source != version {
            debug!(key = %key, version = %version, source = %source, "Using borrowed artifact");
        }
        let context = self.context(&source);
        let config = self.config(&source);
        self.storage.default_path(key, &context, &config)
    }

    /// Make `version` reuse the artifact `key` computed for `from`
    pub fn borrow_artifact(&self, version: &VersionId, key: &StorageKey, from: &VersionId) {
        self.overrides
            .borrow(version.clone(), key.clone(), from.clone());
    }

    /// Storage view bound to one version
    pub fn resolver<'a>(&'a self, version: &'a VersionId) -> ArtifactResolver<'a> {
        ArtifactResolver {
            handle: self,
            version,
        }
    }

    fn snapshot_results(&self) -> BTreeMap<VersionId, Vec<StorageKey>> {
        self.results
            .lock()
            .iter()
            .map(|(version, results)| (version.clone(), results.keys()))
            .collect()
    }
}

/// Storage paths as seen from one version
pub struct ArtifactResolver<'a> {
    handle: &'a PipelineHandle,
    version: &'a VersionId,
}

impl ArtifactResolver<'_> {
    pub fn version(&self) -> &VersionId {
        self.version
    }

    pub fn resolve(&self, key: &StorageKey) -> PathBuf {
        self.handle.path(self.version, key)
    }
}

/// Pipeline executor
#[derive(Default)]
pub struct PipelineExecutor {
    options: ExecutionOptions,
    observer: Option<Arc<dyn TaskObserver>>,
    overrides: Option<PathOverrides>,
}

impl PipelineExecutor {
    pub fn new(options: ExecutionOptions) -> Self {
        Self {
            options,
            observer: None,
            overrides: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Seed the path override table for the run
    pub fn with_overrides(mut self, overrides: PathOverrides) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// Execute a pipeline over every version of `versions`
    pub async fn execute(
        self,
        description: Arc<PipelineDescription>,
        storage: Arc<dyn StorageLayout>,
        repository: RepositoryHandle,
        versions: Arc<dyn VersionGraph>,
    ) -> FlowResult<PipelineResult> {
        let start = Instant::now();

        let graph = Arc::new(ExecutionGraph::build(&description, versions.as_ref())?);
        info!(
            pipeline = %description.name(),
            tasks = graph.task_count(),
            edges = graph.edge_count(),
            "Starting run"
        );

        if self.options.dry_run {
            return Ok(PipelineResult {
                results: BTreeMap::new(),
                statuses: graph.tasks().map(|t| (t.clone(), StepStatus::NotRun)).collect(),
                duration: start.elapsed(),
            });
        }

        let mut handle = PipelineHandle::new(Arc::clone(&description), versions, storage, repository);
        if let Some(overrides) = self.overrides {
            handle = handle.with_overrides(overrides);
        }
        let handle = Arc::new(handle);

        let driver = Arc::new(TaskDriver {
            handle: Arc::clone(&handle),
            observer: self.observer,
            statuses: Mutex::new(BTreeMap::new()),
        });

        let scheduler = Scheduler::new(
            &description,
            Arc::clone(&graph),
            Arc::clone(&driver) as Arc<dyn TaskRunner>,
            self.options.max_parallelism,
        );

        if let Err(e) = scheduler.run().await {
            for failure in e.failures() {
                error!(step = %failure.step, version = %failure.version, "{:#}", failure.error);
            }
            return Err(e);
        }

        let result = PipelineResult {
            results: handle.snapshot_results(),
            statuses: std::mem::take(&mut *driver.statuses.lock()),
            duration: start.elapsed(),
        };
        info!(
            pipeline = %description.name(),
            status = %result.status(),
            "Run finished in {:.2}s",
            result.duration.as_secs_f64()
        );

        Ok(result)
    }
}

/// Execute `description` over `versions` with default options
pub async fn run(
    description: Arc<PipelineDescription>,
    storage: Arc<dyn StorageLayout>,
    repository: RepositoryHandle,
    versions: Arc<dyn VersionGraph>,
) -> FlowResult<PipelineResult> {
    PipelineExecutor::default()
        .execute(description, storage, repository, versions)
        .await
}

/// Executes single tasks for the scheduler
struct TaskDriver {
    handle: Arc<PipelineHandle>,
    observer: Option<Arc<dyn TaskObserver>>,
    statuses: Mutex<BTreeMap<Task, StepStatus>>,
}

impl TaskDriver {
    async fn execute(&self, task: &Task) -> anyhow::Result<StepStatus> {
        let handle = self.handle.as_ref();
        let description = handle.description();
        let step = description
            .step(&task.step)
            .ok_or_else(|| anyhow::anyhow!("step '{}' is not part of the pipeline", task.step))?;

        let context = handle.context(&task.version);
        if description.should_skip(handle.versions(), &context) {
            debug!(task = %task, "Version skipped");
            return Ok(StepStatus::NotRun);
        }

        let config = handle.config(&task.version);
        let worker = step.worker(&config);
        if !worker.should_execute(handle, &context).await? {
            debug!(task = %task, "Nothing to do");
            return Ok(StepStatus::NotRun);
        }

        let results = handle.results(&task.version);
        let input = description.input_for(step.name(), &handle.resolver(&task.version), &results);
        let output = worker
            .run(handle, &context, input, Arc::clone(&results))
            .await?;

        if output.status.is_failure() {
            anyhow::bail!("worker reported failure");
        }
        if !Arc::ptr_eq(&output.results, &results) {
            results.merge_from(&output.results);
        }

        Ok(output.status)
    }
}

#[async_trait]
impl TaskRunner for TaskDriver {
    async fn run_task(&self, task: &Task) -> anyhow::Result<()> {
        if let Some(observer) = &self.observer {
            observer.task_started(task);
        }

        let start = Instant::now();
        let outcome = self.execute(task).await;
        let duration = start.elapsed();

        let status = match &outcome {
            Ok(status) => *status,
            Err(_) => StepStatus::Failed,
        };
        match &outcome {
            Ok(StepStatus::Success) => {
                info!(task = %task, "Completed in {:.2}s", duration.as_secs_f64())
            }
            Ok(StepStatus::UpToDate) => {
                info!(task = %task, "Up to date ({:.2}s)", duration.as_secs_f64())
            }
            Ok(_) => debug!(task = %task, "Not run"),
            Err(e) => error!(task = %task, "Failed after {:.2}s: {:#}", duration.as_secs_f64(), e),
        }

        self.statuses.lock().insert(task.clone(), status);
        if let Some(observer) = &self.observer {
            observer.task_finished(task, status, duration);
        }

        outcome.map(|_| ())
    }
}
