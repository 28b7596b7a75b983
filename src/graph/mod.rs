// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Version graphs and the task graph built over them

mod execution;
mod version;

pub use execution::{ExecutionGraph, Task};
pub use version::{DagVersionGraph, VersionEntry, VersionGraph, VersionGraphFile, VersionId};
