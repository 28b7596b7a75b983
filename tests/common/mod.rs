#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use histflow::engine::PipelineHandle;
use histflow::graph::{DagVersionGraph, Task, VersionId};
use histflow::pipeline::{Context, StepOutput, StepResults, StepName};
use histflow::workers::{StepInput, Worker};

static INIT: Once = Once::new();

/// Initialise tracing for tests; enable levels with `RUST_LOG=debug`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// The branching history `1 -> 2 -> 3` and `2 -> 4`
pub fn branching_versions() -> DagVersionGraph {
    DagVersionGraph::new()
        .with_version("1", &[])
        .unwrap()
        .with_version("2", &["1"])
        .unwrap()
        .with_version("3", &["2"])
        .unwrap()
        .with_version("4", &["2"])
        .unwrap()
}

/// Start/end of one worker body, as logical clock ticks
#[derive(Debug, Clone)]
pub struct Interval {
    pub task: Task,
    pub start: usize,
    pub end: Option<usize>,
}

impl Interval {
    pub fn overlaps(&self, other: &Interval) -> bool {
        let (Some(a_end), Some(b_end)) = (self.end, other.end) else {
            return false;
        };
        self.start < b_end && other.start < a_end
    }
}

/// Shared record of every worker body that ran
#[derive(Debug, Default)]
pub struct Timeline {
    clock: AtomicUsize,
    intervals: Mutex<Vec<Interval>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Timeline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn start(&self, task: Task) -> usize {
        let now = self.clock.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let mut intervals = self.intervals.lock();
        intervals.push(Interval {
            task,
            start: now,
            end: None,
        });
        intervals.len() - 1
    }

    fn end(&self, slot: usize) {
        let now = self.clock.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.intervals.lock()[slot].end = Some(now);
    }

    pub fn intervals(&self) -> Vec<Interval> {
        self.intervals.lock().clone()
    }

    pub fn interval(&self, task: &Task) -> Option<Interval> {
        self.intervals().into_iter().find(|i| &i.task == task)
    }

    pub fn started(&self) -> HashSet<Task> {
        self.intervals().into_iter().map(|i| i.task).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

type Gate = Arc<dyn Fn(&Task) -> Option<Arc<tokio::sync::Barrier>> + Send + Sync>;

/// Worker that records its interval, optionally waits at a barrier and
/// optionally fails for chosen versions
#[derive(Clone)]
pub struct ProbeWorker {
    step: StepName,
    timeline: Arc<Timeline>,
    delay: Duration,
    fail_at: HashSet<VersionId>,
    gate: Option<Gate>,
}

impl ProbeWorker {
    pub fn new(step: &str, timeline: &Arc<Timeline>) -> Self {
        Self {
            step: StepName::from(step),
            timeline: Arc::clone(timeline),
            delay: Duration::from_millis(5),
            fail_at: HashSet::new(),
            gate: None,
        }
    }

    pub fn failing_at(mut self, version: &str) -> Self {
        self.fail_at.insert(VersionId::from(version));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gate<F>(mut self, gate: F) -> Self
    where
        F: Fn(&Task) -> Option<Arc<tokio::sync::Barrier>> + Send + Sync + 'static,
    {
        self.gate = Some(Arc::new(gate));
        self
    }
}

#[async_trait]
impl Worker for ProbeWorker {
    async fn run(
        &self,
        _pipeline: &PipelineHandle,
        context: &Context,
        _input: StepInput,
        results: Arc<StepResults>,
    ) -> anyhow::Result<StepOutput> {
        let task = Task::new(self.step.clone(), context.version().clone());
        let slot = self.timeline.start(task.clone());

        if let Some(barrier) = self.gate.as_ref().and_then(|gate| gate(&task)) {
            barrier.wait().await;
        }
        tokio::time::sleep(self.delay).await;

        self.timeline.end(slot);

        if self.fail_at.contains(context.version()) {
            anyhow::bail!("cannot process {}", task);
        }
        results.add(format!("{}.out", self.step));
        Ok(StepOutput::success(results))
    }
}
