// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for histflow.

pub mod graph;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use miette::Result;
use std::path::{Path, PathBuf};

use crate::graph::{DagVersionGraph, VersionGraphFile};
use crate::pipeline::PipelineFile;

/// Pipeline runner for branching version histories
#[derive(Parser, Debug)]
#[clap(
    name = "histflow",
    version,
    about = "Run step pipelines over branching version histories",
    long_about = None,
    after_help = "Examples:\n\
        histflow validate                       Check histflow.yaml\n\
        histflow graph --format dot             Print the task graph\n\
        histflow run --jobs 4                   Run with at most 4 commands at once\n\n\
        See 'histflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline over every version
    Run {
        /// Pipeline file
        #[clap(short, long, default_value = "histflow.yaml")]
        pipeline: PathBuf,

        /// Version graph file
        #[clap(short = 'g', long, default_value = "versions.yaml")]
        versions: PathBuf,

        /// Repository handed to steps as HISTFLOW_REPOSITORY
        #[clap(long, value_name = "DIR")]
        repository: Option<PathBuf>,

        /// Maximum number of commands running at once
        #[clap(short, long, env = "HISTFLOW_JOBS")]
        jobs: Option<usize>,

        /// Dry run (show what would be done)
        #[clap(long)]
        dry_run: bool,
    },

    /// Validate pipeline configuration
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = "histflow.yaml")]
        pipeline: PathBuf,
    },

    /// Show the task graph
    Graph {
        /// Pipeline file
        #[clap(short, long, default_value = "histflow.yaml")]
        pipeline: PathBuf,

        /// Version graph file
        #[clap(short = 'g', long, default_value = "versions.yaml")]
        versions: PathBuf,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = GraphFormat::Text)]
        format: GraphFormat,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
    Json,
}

pub(crate) fn load_pipeline(path: &Path) -> Result<PipelineFile> {
    if !path.exists() {
        return Err(miette::miette!(
            "Pipeline file not found: {}",
            path.display()
        ));
    }

    PipelineFile::from_file(path).map_err(|e| miette::miette!("Failed to load pipeline: {}", e))
}

pub(crate) fn load_versions(path: &Path) -> Result<DagVersionGraph> {
    if !path.exists() {
        return Err(miette::miette!(
            "Version graph file not found: {}",
            path.display()
        ));
    }

    let file = VersionGraphFile::from_file(path)
        .map_err(|e| miette::miette!("Failed to load version graph: {}", e))?;
    Ok(file.into_graph()?)
}
