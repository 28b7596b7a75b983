// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Pipeline execution engine
//!
//! Schedules the tasks of an execution graph, drives workers and resolves
//! artifact storage paths.

mod executor;
mod scheduler;
mod state;
mod storage;

pub use executor::{
    run, ArtifactResolver, ExecutionOptions, PipelineExecutor, PipelineHandle, PipelineResult,
    RepositoryHandle, TaskObserver,
};
pub use scheduler::{Scheduler, TaskFailure, TaskRunner};
pub use storage::{DirectoryLayout, PathOverrides, StorageLayout};
