// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Error types
//!
//! Description errors are programming errors in a pipeline definition and are
//! raised before anything runs. Worker failures are collected per task and
//! surfaced together once the scheduler has drained.

use miette::Diagnostic;
use std::fmt::Write as _;
use std::path::PathBuf;
use thiserror::Error;

use crate::engine::TaskFailure;

/// Result type for histflow operations
pub type FlowResult<T> = Result<T, FlowError>;

/// Main error type for histflow
#[derive(Error, Debug, Diagnostic)]
pub enum FlowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Description Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline has no steps")]
    #[diagnostic(
        code(histflow::empty_pipeline),
        help("Declare at least one step in the pipeline description")
    )]
    EmptyPipeline,

    #[error("Step '{step}' is declared more than once")]
    #[diagnostic(
        code(histflow::duplicate_step),
        help("Each step may appear only once in the step order")
    )]
    DuplicateStep { step: String },

    #[error("Step '{step}' declares an intra-version dependency on itself")]
    #[diagnostic(
        code(histflow::self_dependency),
        help("Declare '{step}' as an inter-version dependency instead")
    )]
    SelfDependency { step: String },

    #[error("Step '{step}' requires step '{dependency}', which is not part of the pipeline")]
    #[diagnostic(
        code(histflow::missing_required_dependency),
        help("Add '{dependency}' to the pipeline or relax the dependency to not-required")
    )]
    MissingRequiredDependency { step: String, dependency: String },

    #[error("Step '{step}' depends on '{dependency}', which is ordered after it")]
    #[diagnostic(
        code(histflow::forward_dependency),
        help("Move '{dependency}' before '{step}' or express the relation as inter-version")
    )]
    ForwardDependency { step: String, dependency: String },

    #[error("Conflicting dependency declarations for '{step}' -> '{dependency}'")]
    #[diagnostic(code(histflow::conflicting_dependency))]
    ConflictingDependency { step: String, dependency: String },

    #[error("Invalid pipeline definition: {reason}")]
    #[diagnostic(code(histflow::invalid_definition))]
    InvalidDefinition {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Version '{version}' is not part of the version graph")]
    #[diagnostic(code(histflow::unknown_version))]
    UnknownVersion { version: String },

    #[error("Circular dependency detected between tasks")]
    #[diagnostic(
        code(histflow::circular_dependency),
        help("The version graph must be acyclic and parents must precede children")
    )]
    CircularDependency { tasks: Vec<String> },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{} task(s) failed: {}", .failures.len(), summarize(.failures))]
    #[diagnostic(code(histflow::run_failed))]
    RunFailed { failures: Vec<TaskFailure> },

    #[error("Scheduler stalled with {pending} task(s) that can never become ready")]
    #[diagnostic(code(histflow::stalled))]
    Stalled { pending: usize },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(histflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(histflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(histflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(histflow::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for FlowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for FlowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl FlowError {
    /// Whether this error comes from an invalid pipeline description
    pub fn is_description_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyPipeline
                | Self::DuplicateStep { .. }
                | Self::SelfDependency { .. }
                | Self::MissingRequiredDependency { .. }
                | Self::ForwardDependency { .. }
                | Self::ConflictingDependency { .. }
        )
    }

    /// Failed tasks carried by a [`FlowError::RunFailed`]
    pub fn failures(&self) -> &[TaskFailure] {
        match self {
            Self::RunFailed { failures } => failures,
            _ => &[],
        }
    }
}

fn summarize(failures: &[TaskFailure]) -> String {
    let mut out = String::new();
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(
            out,
            "{} @ {}: {:#}",
            failure.step, failure.version, failure.error
        );
    }
    out
}
