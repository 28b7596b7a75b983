// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! histflow - step pipelines over branching version histories

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use histflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "histflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            pipeline,
            versions,
            repository,
            jobs,
            dry_run,
        } => histflow::cli::run::run(pipeline, versions, repository, jobs, dry_run, cli.verbose).await,
        Commands::Validate { pipeline } => {
            histflow::cli::validate::run(pipeline, cli.verbose).await
        }
        Commands::Graph {
            pipeline,
            versions,
            format,
        } => histflow::cli::graph::run(pipeline, versions, format, cli.verbose).await,
    }
}
