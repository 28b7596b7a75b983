// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Pipeline definition files
//!
//! Defines the schema for `histflow.yaml` files. Every step runs a shell
//! command through [`ShellWorker`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::DirectoryLayout;
use crate::errors::FlowError;
use crate::graph::{VersionGraph, VersionId};
use crate::pipeline::{
    Config, Context, ParallelismPolicy, PipelineDescription, Step, StepDependencies,
};
use crate::workers::{ShellWorker, StepInput, Worker};

/// Pipeline definition from `histflow.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Pipeline name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Maximum number of commands running at once
    #[serde(default)]
    pub max_parallelism: Option<usize>,

    /// Artifact store root
    #[serde(default = "default_store")]
    pub store: PathBuf,

    /// Hash the version config into artifact paths
    #[serde(default)]
    pub fingerprint_config: bool,

    /// Environment for every version
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Per-version environment, overriding `env`
    #[serde(default)]
    pub version_env: BTreeMap<VersionId, BTreeMap<String, String>>,

    /// Versions whose work is bypassed entirely
    #[serde(default)]
    pub skip_versions: BTreeSet<VersionId>,

    /// Steps in execution order
    pub steps: Vec<StepDefinition>,
}

fn default_store() -> PathBuf {
    PathBuf::from(".histflow/store")
}

fn default_shell() -> String {
    "bash".to_string()
}

/// A single step definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step name (must be unique within the pipeline)
    pub name: String,

    /// Shell command to run per version
    pub command: String,

    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub parallelism: ParallelismPolicy,

    /// Steps that must exist and complete first (same version)
    #[serde(default)]
    pub requires: Vec<String>,

    /// Steps that complete first when present (same version)
    #[serde(default)]
    pub after: Vec<String>,

    /// Steps that complete first for every predecessor version
    #[serde(default)]
    pub inter_version: Vec<String>,

    /// Artifacts the command produces
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Environment variables for this step
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Versions this step has nothing to do for
    #[serde(default)]
    pub skip_versions: BTreeSet<VersionId>,
}

impl PipelineFile {
    /// Load a pipeline file from disk
    pub fn from_file(path: &Path) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path).map_err(|e| FlowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a pipeline file from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, FlowError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    pub fn to_yaml(&self) -> Result<String, FlowError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    pub fn get_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Config of a version: `env` overlaid with its `version_env` entry
    pub fn config_for(&self, version: &VersionId) -> Config {
        let base: Config = self.env.clone().into_iter().collect();
        match self.version_env.get(version) {
            Some(overrides) => base.overlay(&overrides.clone().into_iter().collect()),
            None => base,
        }
    }

    /// Artifact layout rooted at `store`, relative to `base`
    pub fn layout(&self, base: &Path) -> DirectoryLayout {
        DirectoryLayout::new(base.join(&self.store)).with_config_fingerprint(self.fingerprint_config)
    }

    /// Build the validated pipeline description
    pub fn into_description(self) -> Result<PipelineDescription, FlowError> {
        let mut builder = PipelineDescription::builder(self.name.clone());

        for definition in &self.steps {
            if definition.command.trim().is_empty() {
                return Err(FlowError::InvalidDefinition {
                    reason: format!("step '{}' has an empty command", definition.name),
                    help: Some("Every step needs a shell command to run".to_string()),
                });
            }

            let mut dependencies = StepDependencies::new();
            for step in &definition.requires {
                dependencies = dependencies.requires(step.as_str());
            }
            for step in &definition.after {
                dependencies = dependencies.after(step.as_str());
            }
            for step in &definition.inter_version {
                dependencies = dependencies.inter_version(step.as_str());
            }

            let template = definition.worker();
            let step = Step::new(
                definition.name.as_str(),
                definition.parallelism,
                Arc::new(move |config: &Config| {
                    Arc::new(template.clone().with_config(config.clone())) as Arc<dyn Worker>
                }),
            );

            builder = builder
                .step_with(step, dependencies)
                .input(definition.name.as_str(), StepInput::all_artifacts);
        }

        if !self.skip_versions.is_empty() {
            let skipped = self.skip_versions.clone();
            builder = builder.skip_when(move |_: &dyn VersionGraph, context: &Context| {
                skipped.contains(context.version())
            });
        }

        let file = Arc::new(self);
        builder
            .config_factory(move |version| file.config_for(version))
            .build()
    }
}

impl StepDefinition {
    fn worker(&self) -> ShellWorker {
        ShellWorker::new(self.name.as_str(), self.command.clone())
            .with_shell(self.shell.clone())
            .with_outputs(self.outputs.iter().map(|o| o.as_str().into()))
            .with_env(self.env.clone())
            .with_skip_versions(self.skip_versions.iter().cloned())
    }
}
