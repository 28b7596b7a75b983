// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! In-flight execution plan
//!
//! The scheduler walks an [`ExecutionGraph`] to completion. Each dispatched
//! task runs on its own tokio task; the caller of [`Scheduler::run`] only
//! coordinates, waking on every state change and re-checking the run state.

use async_trait::async_trait;
use parking_lot::Mutex;
use petgraph::graph::NodeIndex;
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

use tracing::{debug, error};

use crate::engine::state::{Progress, RunState};
use crate::errors::{FlowError, FlowResult};
use crate::graph::{ExecutionGraph, Task, VersionId};
use crate::pipeline::{PipelineDescription, StepName};

/// Runs the body of a single task
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run_task(&self, task: &Task) -> anyhow::Result<()>;
}

/// A task that failed, with the error its body raised
#[derive(Debug)]
pub struct TaskFailure {
    pub step: StepName,
    pub version: VersionId,
    pub error: anyhow::Error,
}

impl TaskFailure {
    pub fn task(&self) -> Task {
        Task::new(self.step.clone(), self.version.clone())
    }
}

/// Scheduler for one run
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    graph: Arc<ExecutionGraph>,
    state: Mutex<RunState>,
    progress: Notify,
    permits: Option<Arc<Semaphore>>,
    runner: Arc<dyn TaskRunner>,
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

impl Scheduler {
    /// Create a scheduler.
    ///
    /// `max_parallelism` bounds how many task bodies run at once; `None`
    /// leaves it unbounded.
    pub fn new(
        description: &PipelineDescription,
        graph: Arc<ExecutionGraph>,
        runner: Arc<dyn TaskRunner>,
        max_parallelism: Option<usize>,
    ) -> Self {
        let sequential: HashSet<StepName> = description
            .steps()
            .iter()
            .filter(|step| step.policy().is_sequential())
            .map(|step| step.name().clone())
            .collect();

        let state = RunState::new(&graph, sequential);
        let permits = max_parallelism.map(|max| Arc::new(Semaphore::new(max.max(1))));

        Self {
            inner: Arc::new(SchedulerInner {
                graph,
                state: Mutex::new(state),
                progress: Notify::new(),
                permits,
                runner,
            }),
        }
    }

    /// Execute every task, returning once all completed or, after a
    /// failure, once in-flight tasks have drained.
    pub async fn run(self) -> FlowResult<()> {
        let initial = self.inner.state.lock().claim_ready(&self.inner.graph);
        self.inner.dispatch(initial);

        loop {
            let progress = self.inner.state.lock().progress();

            match progress {
                Progress::Running => self.inner.progress.notified().await,
                Progress::Finished => {
                    debug!(tasks = self.inner.graph.task_count(), "All tasks completed");
                    return Ok(());
                }
                Progress::Failed(failures) => {
                    let failures = failures
                        .into_iter()
                        .map(|(node, error)| {
                            let task = self.inner.graph.task_at(node);
                            TaskFailure {
                                step: task.step.clone(),
                                version: task.version.clone(),
                                error,
                            }
                        })
                        .collect();
                    return Err(FlowError::RunFailed { failures });
                }
                Progress::Stalled { pending } => {
                    error!(pending, "No task is running or ready");
                    return Err(FlowError::Stalled { pending });
                }
            }
        }
    }
}

impl SchedulerInner {
    fn dispatch(self: &Arc<Self>, nodes: Vec<NodeIndex>) {
        for node in nodes {
            tokio::spawn(Self::execute(Arc::clone(self), node));
        }
    }

    fn execute(self: Arc<Self>, node: NodeIndex) -> Job {
        Box::pin(async move {
            let task = self.graph.task_at(node).clone();

            // A task counts as executing while it waits for a permit
            let permit = match &self.permits {
                Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        self.finish(node, Err(anyhow::anyhow!("concurrency limiter closed: {}", e)));
                        return;
                    }
                },
                None => None,
            };

            // Run the body on its own task so a panic surfaces as a JoinError
            let runner = Arc::clone(&self.runner);
            let body = task.clone();
            let outcome = match tokio::spawn(async move { runner.run_task(&body).await }).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(anyhow::anyhow!(
                    "worker panicked: {}",
                    panic_message(e.into_panic())
                )),
                Err(e) => Err(anyhow::anyhow!("worker was cancelled: {}", e)),
            };
            drop(permit);

            if let Err(e) = &outcome {
                debug!(task = %task, "Task failed: {:#}", e);
            }
            self.finish(node, outcome);
        })
    }

    fn finish(self: &Arc<Self>, node: NodeIndex, outcome: anyhow::Result<()>) {
        let claimed = {
            let mut state = self.state.lock();
            match outcome {
                Ok(()) => state.complete(node, &self.graph),
                Err(error) => state.fail(node, &self.graph, error),
            }
            state.claim_ready(&self.graph)
        };

        self.progress.notify_one();
        self.dispatch(claimed);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DagVersionGraph;
    use crate::pipeline::{ParallelismPolicy, Step, StepDependencies};
    use crate::workers::NoopWorker;

    struct Recorder {
        order: Mutex<Vec<Task>>,
        fail: Option<Task>,
        panic: Option<Task>,
    }

    #[async_trait]
    impl TaskRunner for Recorder {
        async fn run_task(&self, task: &Task) -> anyhow::Result<()> {
            tokio::task::yield_now().await;
            if self.panic.as_ref() == Some(task) {
                panic!("corrupt input");
            }
            if self.fail.as_ref() == Some(task) {
                anyhow::bail!("cannot remap {}", task);
            }
            self.order.lock().push(task.clone());
            Ok(())
        }
    }

    fn recorder(fail: Option<Task>, panic: Option<Task>) -> Arc<Recorder> {
        Arc::new(Recorder {
            order: Mutex::new(Vec::new()),
            fail,
            panic,
        })
    }

    fn setup() -> (PipelineDescription, Arc<ExecutionGraph>) {
        let description = PipelineDescription::builder("test")
            .step(Step::from_worker("fetch", ParallelismPolicy::Parallel, Arc::new(NoopWorker)))
            .step_with(
                Step::from_worker("remap", ParallelismPolicy::Parallel, Arc::new(NoopWorker)),
                StepDependencies::new().requires("fetch").inter_version("remap"),
            )
            .build()
            .unwrap();
        let versions = DagVersionGraph::linear(["1", "2", "3"]).unwrap();
        let graph = ExecutionGraph::build(&description, &versions).unwrap();
        (description, Arc::new(graph))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_every_task_in_order() {
        let (description, graph) = setup();
        let runner = recorder(None, None);

        Scheduler::new(&description, Arc::clone(&graph), runner.clone(), None)
            .run()
            .await
            .unwrap();

        let order = runner.order.lock().clone();
        assert_eq!(order.len(), graph.task_count());
        let position = |t: &Task| order.iter().position(|o| o == t).unwrap();
        for task in graph.tasks() {
            for prerequisite in graph.prerequisites(task) {
                assert!(position(&prerequisite) < position(task));
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_is_reported() {
        let (description, graph) = setup();
        let runner = recorder(Some(Task::new("remap", "2")), None);

        let err = Scheduler::new(&description, graph, runner.clone(), Some(2))
            .run()
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].task(), Task::new("remap", "2"));
        assert!(!runner.order.lock().contains(&Task::new("remap", "3")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_becomes_failure() {
        let (description, graph) = setup();
        let runner = recorder(None, Some(Task::new("fetch", "3")));

        let err = Scheduler::new(&description, graph, runner, None)
            .run()
            .await
            .unwrap_err();

        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert!(format!("{}", failures[0].error).contains("corrupt input"));
    }
}
