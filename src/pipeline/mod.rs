// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Pipeline definitions and types
//!
//! This module defines the declarative side of a run: steps, their
//! dependencies, outcomes, and the validated description tying them together.

mod context;
mod definition;
mod dependency;
mod description;
mod status;
mod step;
mod validation;

pub use context::{Config, Context};
pub use definition::{PipelineFile, StepDefinition};
pub use dependency::{DependencyRelation, StepDependencies};
pub use description::{
    ConfigFactory, ContextFactory, InputWiring, PipelineDescription, PipelineDescriptionBuilder,
    SkipPredicate,
};
pub use status::{StepOutput, StepResults, StepStatus, StorageKey};
pub use step::{ParallelismPolicy, Step, StepName};
pub use validation::{PipelineValidator, ValidationReport};
