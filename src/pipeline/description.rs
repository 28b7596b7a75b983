// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Pipeline descriptions
//!
//! A description is the ordered step list plus everything the engine needs to
//! run it per version: dependency declarations, input wiring, the skip
//! predicate and the context/config factories. Descriptions are validated on
//! construction and immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::warn;

use crate::engine::ArtifactResolver;
use crate::errors::FlowError;
use crate::graph::{VersionGraph, VersionId};
use crate::pipeline::{
    Config, Context, DependencyRelation, PipelineValidator, Step, StepDependencies, StepName,
    StepResults, ValidationReport,
};
use crate::workers::StepInput;

/// Maps storage and a version's accumulated results to a step's input
pub type InputWiring = Arc<dyn Fn(&ArtifactResolver<'_>, &StepResults) -> StepInput + Send + Sync>;

/// Decides whether a version's work is bypassed entirely
pub type SkipPredicate = Arc<dyn Fn(&dyn VersionGraph, &Context) -> bool + Send + Sync>;

/// Produces the context for a version
pub type ContextFactory = Arc<dyn Fn(&VersionId, &dyn VersionGraph) -> Context + Send + Sync>;

/// Produces the config for a version
pub type ConfigFactory = Arc<dyn Fn(&VersionId) -> Config + Send + Sync>;

/// Validated pipeline description
pub struct PipelineDescription {
    name: String,
    steps: Vec<Step>,
    dependencies: HashMap<StepName, StepDependencies>,
    inputs: HashMap<StepName, InputWiring>,
    skip: Option<SkipPredicate>,
    context_factory: ContextFactory,
    config_factory: ConfigFactory,
}

impl PipelineDescription {
    pub fn builder(name: impl Into<String>) -> PipelineDescriptionBuilder {
        PipelineDescriptionBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in declared order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, name: &StepName) -> Option<&Step> {
        self.steps.iter().find(|s| s.name() == name)
    }

    pub fn contains(&self, name: &StepName) -> bool {
        self.position(name).is_some()
    }

    /// Index of a step in the declared order
    pub fn position(&self, name: &StepName) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name().as_str()).collect()
    }

    /// Full dependency declaration of a step
    pub fn dependencies(&self, step: &StepName) -> &StepDependencies {
        static EMPTY: OnceLock<StepDependencies> = OnceLock::new();
        self.dependencies
            .get(step)
            .unwrap_or_else(|| EMPTY.get_or_init(StepDependencies::default))
    }

    /// Steps `step` depends on within the same version
    pub fn intra_dependencies(&self, step: &StepName) -> Vec<StepName> {
        self.dependencies(step)
            .intra()
            .map(|(dep, _)| dep.clone())
            .collect()
    }

    /// Steps `step` depends on for each predecessor version
    pub fn inter_dependencies(&self, step: &StepName) -> Vec<StepName> {
        self.dependencies(step).inter().cloned().collect()
    }

    /// Intra-version relation between `step` and `dependency`
    pub fn relation(&self, step: &StepName, dependency: &StepName) -> DependencyRelation {
        self.dependencies(step).relation(dependency)
    }

    pub(crate) fn declared_dependencies(&self) -> impl Iterator<Item = (&StepName, &StepDependencies)> {
        self.dependencies.iter()
    }

    /// Wire a step's input; steps without wiring get [`StepInput::Empty`]
    pub fn input_for(
        &self,
        step: &StepName,
        resolver: &ArtifactResolver<'_>,
        results: &StepResults,
    ) -> StepInput {
        match self.inputs.get(step) {
            Some(wiring) => wiring(resolver, results),
            None => StepInput::Empty,
        }
    }

    pub fn should_skip(&self, versions: &dyn VersionGraph, context: &Context) -> bool {
        self.skip
            .as_ref()
            .map(|skip| skip(versions, context))
            .unwrap_or(false)
    }

    pub fn create_context(&self, version: &VersionId, versions: &dyn VersionGraph) -> Context {
        (self.context_factory)(version, versions)
    }

    pub fn create_config(&self, version: &VersionId) -> Config {
        (self.config_factory)(version)
    }

    /// Re-run validation (descriptions are already validated when built)
    pub fn validate(&self) -> Result<ValidationReport, FlowError> {
        PipelineValidator::validate(self)
    }
}

impl fmt::Debug for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDescription")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Builder for [`PipelineDescription`]
pub struct PipelineDescriptionBuilder {
    name: String,
    steps: Vec<Step>,
    dependencies: HashMap<StepName, StepDependencies>,
    inputs: HashMap<StepName, InputWiring>,
    skip: Option<SkipPredicate>,
    context_factory: Option<ContextFactory>,
    config_factory: Option<ConfigFactory>,
    error: Option<FlowError>,
}

impl PipelineDescriptionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            dependencies: HashMap::new(),
            inputs: HashMap::new(),
            skip: None,
            context_factory: None,
            config_factory: None,
            error: None,
        }
    }

    /// Append a step to the order
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a step together with its dependencies
    pub fn step_with(self, step: Step, dependencies: StepDependencies) -> Self {
        let name = step.name().clone();
        self.step(step).depends(name, dependencies)
    }

    /// Merge additional dependencies into a step's declaration
    pub fn depends(mut self, step: impl Into<StepName>, dependencies: StepDependencies) -> Self {
        let step = step.into();
        let existing = self.dependencies.remove(&step).unwrap_or_default();
        match existing.merge(dependencies, &step) {
            Ok(merged) => {
                self.dependencies.insert(step, merged);
            }
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn input<F>(mut self, step: impl Into<StepName>, wiring: F) -> Self
    where
        F: Fn(&ArtifactResolver<'_>, &StepResults) -> StepInput + Send + Sync + 'static,
    {
        self.inputs.insert(step.into(), Arc::new(wiring));
        self
    }

    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn VersionGraph, &Context) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    pub fn context_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&VersionId, &dyn VersionGraph) -> Context + Send + Sync + 'static,
    {
        self.context_factory = Some(Arc::new(factory));
        self
    }

    pub fn config_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&VersionId) -> Config + Send + Sync + 'static,
    {
        self.config_factory = Some(Arc::new(factory));
        self
    }

    /// Validate and build the description
    pub fn build(self) -> Result<PipelineDescription, FlowError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let context_factory: ContextFactory = match self.context_factory {
            Some(factory) => factory,
            None => Arc::new(|version: &VersionId, versions: &dyn VersionGraph| {
                Context::new(version.clone(), versions.predecessors(version))
            }),
        };
        let config_factory: ConfigFactory = match self.config_factory {
            Some(factory) => factory,
            None => Arc::new(|_: &VersionId| Config::default()),
        };

        let description = PipelineDescription {
            name: self.name,
            steps: self.steps,
            dependencies: self.dependencies,
            inputs: self.inputs,
            skip: self.skip,
            context_factory,
            config_factory,
        };

        let report = PipelineValidator::validate(&description)?;
        for warning in &report.warnings {
            warn!(pipeline = %description.name, "{}", warning);
        }

        Ok(description)
    }
}
