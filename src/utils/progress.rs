// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Run progress rendering

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::colors::status_marker;
use crate::engine::TaskObserver;
use crate::graph::Task;
use crate::pipeline::StepStatus;

/// Progress bar over all tasks of a run
pub struct RunProgress {
    bar: ProgressBar,
    verbose: bool,
}

impl RunProgress {
    pub fn new(total: usize, verbose: bool) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.blue} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar, verbose }
    }

    /// Hidden bar, for non-interactive output
    pub fn hidden(verbose: bool) -> Self {
        Self {
            bar: ProgressBar::hidden(),
            verbose,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl TaskObserver for RunProgress {
    fn task_started(&self, task: &Task) {
        self.bar.set_message(task.to_string());
    }

    fn task_finished(&self, task: &Task, status: StepStatus, duration: Duration) {
        if self.verbose || status.is_failure() {
            self.bar.println(format!(
                "  {} {} ({:.2}s)",
                status_marker(status),
                task,
                duration.as_secs_f64()
            ));
        }
        self.bar.inc(1);
    }
}
