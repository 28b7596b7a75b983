// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Run command - execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::{load_pipeline, load_versions};
use crate::engine::{ExecutionOptions, PipelineExecutor, RepositoryHandle, TaskObserver};
use crate::errors::FlowError;
use crate::graph::{ExecutionGraph, VersionGraph};
use crate::pipeline::StepStatus;
use crate::utils::{print_error, print_header, print_section, status_label, RunProgress};
use crate::workers::ShellWorker;

/// Run the pipeline
pub async fn run(
    pipeline_path: PathBuf,
    versions_path: PathBuf,
    repository: Option<PathBuf>,
    jobs: Option<usize>,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let file = load_pipeline(&pipeline_path)?;
    let versions: Arc<dyn VersionGraph> = Arc::new(load_versions(&versions_path)?);

    // Check the shells steps run in
    let mut missing: Vec<String> = file
        .steps
        .iter()
        .map(|s| ShellWorker::new(s.name.as_str(), s.command.clone()).with_shell(s.shell.clone()))
        .filter(|w| !w.check_available())
        .map(|w| w.shell().to_string())
        .collect();
    missing.sort();
    missing.dedup();
    if !missing.is_empty() {
        eprintln!("{}", "Missing shells:".red().bold());
        for shell in &missing {
            print_error(shell);
        }
        return Err(miette::miette!("Required shells are not installed"));
    }

    let working_dir = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
    let layout = Arc::new(file.layout(&working_dir));
    let max_parallelism = jobs.or(file.max_parallelism);
    let description = Arc::new(file.into_description()?);

    let graph = ExecutionGraph::build(&description, versions.as_ref())?;

    println!();
    print_header(&format!("Pipeline: {}", description.name()));
    println!(
        "{} step(s) over {} version(s), {} task(s), parallelism {}",
        description.steps().len(),
        versions.versions().len(),
        graph.task_count(),
        max_parallelism
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unlimited".to_string())
    );

    if dry_run {
        print_section("Execution plan");
        println!("{}", graph.to_text()?);
        return Ok(());
    }
    println!();

    let repository = match repository {
        Some(path) => RepositoryHandle::new(path),
        None => RepositoryHandle::none(),
    };

    let progress = Arc::new(RunProgress::new(graph.task_count(), verbose));
    let observer: Arc<dyn TaskObserver> = progress.clone();
    let executor = PipelineExecutor::new(ExecutionOptions {
        max_parallelism,
        dry_run: false,
    })
    .with_observer(observer);

    let outcome = executor
        .execute(Arc::clone(&description), layout, repository, versions)
        .await;
    progress.finish();

    match outcome {
        Ok(result) => {
            print_section("Summary");
            for status in [StepStatus::Success, StepStatus::UpToDate, StepStatus::NotRun] {
                println!("  {:>12}: {}", status_label(status), result.count(status));
            }
            println!();
            println!(
                "{}",
                format!(
                    "Pipeline completed successfully in {:.2}s",
                    result.duration.as_secs_f64()
                )
                .green()
            );
            Ok(())
        }
        Err(FlowError::RunFailed { failures }) => {
            print_section("Failed tasks");
            for failure in &failures {
                print_error(&format!(
                    "{} @ {}: {:#}",
                    failure.step, failure.version, failure.error
                ));
            }
            println!();
            Err(miette::miette!("{} task(s) failed", failures.len()))
        }
        Err(e) => Err(e.into()),
    }
}
