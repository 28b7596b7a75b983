// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! # histflow - Version History Pipelines
//!
//! `histflow` runs a declared list of steps once per version of a branching
//! version history, in dependency order and as parallel as the declared
//! dependencies and parallelism policies allow.
//!
//! ## Features
//!
//! - **Declarative steps** - Intra- and inter-version dependencies, validated up front
//! - **Task graphs** - One task per (step, version), fanned out over merge points
//! - **Concurrent scheduling** - Global parallelism cap and per-step serialization
//! - **Resumable** - Workers report work that is already done
//!
//! ## Quick Start
//!
//! ```bash
//! # Check the pipeline definition
//! histflow validate
//!
//! # Show the task graph
//! histflow graph --format dot
//!
//! # Run every step for every version
//! histflow run --jobs 4
//! ```

pub mod cli;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod pipeline;
pub mod utils;
pub mod workers;

// Re-export commonly used types
pub use engine::{run, ExecutionOptions, PipelineExecutor, PipelineResult};
pub use errors::{FlowError, FlowResult};
pub use graph::{DagVersionGraph, ExecutionGraph, Task, VersionGraph, VersionId};
pub use pipeline::{PipelineDescription, Step, StepDependencies, StepOutput, StepStatus};
pub use workers::{StepInput, Worker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
