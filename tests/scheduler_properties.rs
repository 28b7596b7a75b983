mod common;

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{branching_versions, init_tracing, ProbeWorker, Timeline};
use histflow::engine::{DirectoryLayout, PipelineExecutor, RepositoryHandle, Scheduler, TaskRunner};
use histflow::graph::{DagVersionGraph, ExecutionGraph, Task, VersionGraph, VersionId};
use histflow::pipeline::{ParallelismPolicy, PipelineDescription, Step, StepDependencies};
use histflow::{ExecutionOptions, FlowError, PipelineResult};

fn step(name: &str, policy: ParallelismPolicy, worker: ProbeWorker) -> Step {
    Step::from_worker(name, policy, Arc::new(worker))
}

/// S1; S2 requires S1; S3 requires S1 and depends on itself across versions
fn scenario(timeline: &Arc<Timeline>, s1: ProbeWorker, s2: ProbeWorker) -> PipelineDescription {
    PipelineDescription::builder("scenario")
        .step(step("S1", ParallelismPolicy::Parallel, s1))
        .step_with(
            step("S2", ParallelismPolicy::Parallel, s2),
            StepDependencies::new().requires("S1"),
        )
        .step_with(
            step(
                "S3",
                ParallelismPolicy::Sequential,
                ProbeWorker::new("S3", timeline).with_delay(Duration::from_millis(20)),
            ),
            StepDependencies::new().requires("S1").inter_version("S3"),
        )
        .build()
        .unwrap()
}

async fn execute(
    description: PipelineDescription,
    versions: impl VersionGraph + 'static,
    max_parallelism: Option<usize>,
) -> Result<PipelineResult, FlowError> {
    let store = tempfile::tempdir().unwrap();
    PipelineExecutor::new(ExecutionOptions {
        max_parallelism,
        dry_run: false,
    })
    .execute(
        Arc::new(description),
        Arc::new(DirectoryLayout::new(store.path())),
        RepositoryHandle::none(),
        Arc::new(versions),
    )
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_branching_history_scenario() {
    init_tracing();
    let timeline = Timeline::new();

    // S1 and S2 for versions 3 and 4 must be in flight together to get past
    // their barriers
    let s1_barrier = Arc::new(tokio::sync::Barrier::new(2));
    let s2_barrier = Arc::new(tokio::sync::Barrier::new(2));
    let gate = |barrier: Arc<tokio::sync::Barrier>| {
        move |task: &Task| {
            matches!(task.version.as_str(), "3" | "4").then(|| Arc::clone(&barrier))
        }
    };

    let description = scenario(
        &timeline,
        ProbeWorker::new("S1", &timeline).with_gate(gate(s1_barrier)),
        ProbeWorker::new("S2", &timeline).with_gate(gate(s2_barrier)),
    );

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        execute(description, branching_versions(), None),
    )
    .await
    .expect("independent tasks were serialized")
    .unwrap();

    assert_eq!(result.statuses.len(), 12);
    assert!(result.statuses.values().all(|s| s.is_ok()));

    let s3: Vec<_> = ["1", "2", "3", "4"]
        .iter()
        .map(|v| timeline.interval(&Task::new("S3", *v)).unwrap())
        .collect();

    // Sequential step never overlaps itself
    for (i, a) in s3.iter().enumerate() {
        for b in &s3[i + 1..] {
            assert!(!a.overlaps(b), "{} overlaps {}", a.task, b.task);
        }
    }

    // S3(2) completes before either branch starts
    let s3_2_end = s3[1].end.unwrap();
    assert!(s3_2_end < s3[2].start);
    assert!(s3_2_end < s3[3].start);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_reports_exactly_the_failed_task() {
    init_tracing();
    let timeline = Timeline::new();

    let description = scenario(
        &timeline,
        ProbeWorker::new("S1", &timeline),
        ProbeWorker::new("S2", &timeline).failing_at("2"),
    );

    let err = execute(description, branching_versions(), None)
        .await
        .unwrap_err();

    let failures = err.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task(), Task::new("S2", "2"));
    assert!(failures[0].error.to_string().contains("cannot process S2@2"));

    // Everything that started was allowed to finish
    assert!(timeline.intervals().iter().all(|i| i.end.is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dependents_of_failed_task_never_start() {
    init_tracing();
    let timeline = Timeline::new();

    let description = PipelineDescription::builder("chain")
        .step(step("S1", ParallelismPolicy::Parallel, ProbeWorker::new("S1", &timeline)))
        .step_with(
            step(
                "S2",
                ParallelismPolicy::Parallel,
                ProbeWorker::new("S2", &timeline).failing_at("2"),
            ),
            StepDependencies::new().requires("S1").inter_version("S2"),
        )
        .build()
        .unwrap();

    let err = execute(description, branching_versions(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::RunFailed { .. }));
    let started = timeline.started();
    assert!(!started.contains(&Task::new("S2", "3")));
    assert!(!started.contains(&Task::new("S2", "4")));
    assert!(err.to_string().contains("S2 @ 2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap() {
    init_tracing();
    let timeline = Timeline::new();

    let description = PipelineDescription::builder("wide")
        .step(step(
            "fetch",
            ParallelismPolicy::Parallel,
            ProbeWorker::new("fetch", &timeline).with_delay(Duration::from_millis(15)),
        ))
        .build()
        .unwrap();
    let versions = DagVersionGraph::new()
        .with_version("a", &[])
        .unwrap()
        .with_version("b", &[])
        .unwrap()
        .with_version("c", &[])
        .unwrap()
        .with_version("d", &[])
        .unwrap()
        .with_version("e", &[])
        .unwrap()
        .with_version("f", &[])
        .unwrap();

    execute(description, versions, Some(2)).await.unwrap();

    assert_eq!(timeline.intervals().len(), 6);
    assert!(timeline.max_in_flight() <= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_linear_history_runs_in_order() {
    init_tracing();
    let timeline = Timeline::new();

    let description = PipelineDescription::builder("linear")
        .step_with(
            step("commit", ParallelismPolicy::Parallel, ProbeWorker::new("commit", &timeline)),
            StepDependencies::new().inter_version("commit"),
        )
        .build()
        .unwrap();

    execute(description, DagVersionGraph::linear(["1", "2", "3"]).unwrap(), None)
        .await
        .unwrap();

    let order: Vec<String> = {
        let mut intervals = timeline.intervals();
        intervals.sort_by_key(|i| i.start);
        intervals.into_iter().map(|i| i.task.version.to_string()).collect()
    };
    assert_eq!(order, vec!["1", "2", "3"]);
}

/// Runner that records dispatch and completion order
struct OrderRunner {
    events: Mutex<Vec<(Task, bool)>>,
}

#[async_trait]
impl TaskRunner for OrderRunner {
    async fn run_task(&self, task: &Task) -> anyhow::Result<()> {
        self.events.lock().push((task.clone(), false));
        tokio::task::yield_now().await;
        self.events.lock().push((task.clone(), true));
        Ok(())
    }
}

prop_compose! {
    /// Steps that only depend on earlier steps, over a random history where
    /// every version picks parents among the earlier ones
    fn pipeline_and_history()(
        step_deps in proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), 1..5),
        inter in proptest::collection::vec(any::<bool>(), 5),
        parents in proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), 1..6),
    ) -> (PipelineDescription, DagVersionGraph) {
        let timeline = Timeline::new();
        let mut builder = PipelineDescription::builder("random");
        for (i, raw) in step_deps.iter().enumerate() {
            let name = format!("s{}", i);
            let mut deps = StepDependencies::new();
            if i > 0 {
                let unique: HashSet<usize> = raw.iter().map(|d| d % i).collect();
                for d in unique {
                    deps = deps.requires(format!("s{}", d));
                }
            }
            if inter[i] {
                deps = deps.inter_version(name.clone());
            }
            builder = builder.step_with(
                step(&name, ParallelismPolicy::Parallel, ProbeWorker::new(&name, &timeline)),
                deps,
            );
        }

        let mut versions = DagVersionGraph::new();
        for (i, raw) in parents.iter().enumerate() {
            let parents: Vec<VersionId> = if i == 0 {
                Vec::new()
            } else {
                let unique: HashSet<usize> = raw.iter().map(|p| p % i).collect();
                unique.into_iter().map(|p| VersionId::from(format!("v{}", p))).collect()
            };
            versions.add_version(format!("v{}", i), &parents).unwrap();
        }

        (builder.build().unwrap(), versions)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_scheduler_is_topologically_sound((description, versions) in pipeline_and_history()) {
        let graph = Arc::new(ExecutionGraph::build(&description, &versions).unwrap());
        let runner = Arc::new(OrderRunner { events: Mutex::new(Vec::new()) });

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime
            .block_on(Scheduler::new(&description, Arc::clone(&graph), runner.clone(), Some(3)).run())
            .unwrap();

        let events = runner.events.lock().clone();
        let starts: Vec<&Task> = events.iter().filter(|(_, done)| !done).map(|(t, _)| t).collect();

        // Every task exactly once
        let unique: HashSet<&Task> = starts.iter().copied().collect();
        prop_assert_eq!(starts.len(), graph.task_count());
        prop_assert_eq!(unique.len(), graph.task_count());

        // Prerequisites finished before dependents started
        let position = |task: &Task, done: bool| {
            events.iter().position(|(t, d)| t == task && *d == done).unwrap()
        };
        for task in graph.tasks() {
            for prerequisite in graph.prerequisites(task) {
                prop_assert!(position(&prerequisite, true) < position(task, false));
            }
        }
    }
}
