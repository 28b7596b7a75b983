// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Graph command - print the task graph

use miette::Result;
use std::path::PathBuf;

use super::{load_pipeline, load_versions, GraphFormat};
use crate::graph::ExecutionGraph;

/// Run the graph command
pub async fn run(
    pipeline_path: PathBuf,
    versions_path: PathBuf,
    format: GraphFormat,
    _verbose: bool,
) -> Result<()> {
    let description = load_pipeline(&pipeline_path)?.into_description()?;
    let versions = load_versions(&versions_path)?;

    let graph = ExecutionGraph::build(&description, &versions)?;

    let output = match format {
        GraphFormat::Text => graph.to_text()?,
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
        GraphFormat::Json => graph.to_json()?,
    };

    println!("{}", output);

    Ok(())
}
