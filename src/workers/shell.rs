// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Shell worker
//!
//! Runs a shell command per version. Artifact locations, the version and its
//! predecessors are exported as environment variables.

use anyhow::Context as _;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

use tracing::debug;

use super::{StepInput, Worker};
use crate::engine::PipelineHandle;
use crate::graph::VersionId;
use crate::pipeline::{Config, Context, StepName, StepOutput, StepResults, StorageKey};

/// Worker running a shell command
#[derive(Debug, Clone)]
pub struct ShellWorker {
    step: StepName,
    command: String,
    shell: String,
    outputs: Vec<StorageKey>,
    env: BTreeMap<String, String>,
    skip_versions: BTreeSet<VersionId>,
    config: Config,
}

impl ShellWorker {
    pub fn new(step: impl Into<StepName>, command: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            command: command.into(),
            shell: "bash".to_string(),
            outputs: Vec::new(),
            env: BTreeMap::new(),
            skip_versions: BTreeSet::new(),
            config: Config::new(),
        }
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Artifacts the command produces
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = StorageKey>) -> Self {
        self.outputs = outputs.into_iter().collect();
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Versions the command has nothing to do for
    pub fn with_skip_versions(mut self, versions: impl IntoIterator<Item = VersionId>) -> Self {
        self.skip_versions = versions.into_iter().collect();
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Whether the configured shell can be found on `PATH`
    pub fn check_available(&self) -> bool {
        which::which(&self.shell).is_ok()
    }

    fn output_paths(&self, pipeline: &PipelineHandle, version: &VersionId) -> Vec<(StorageKey, PathBuf)> {
        let resolver = pipeline.resolver(version);
        self.outputs
            .iter()
            .map(|key| (key.clone(), resolver.resolve(key)))
            .collect()
    }
}

#[async_trait]
impl Worker for ShellWorker {
    async fn should_execute(
        &self,
        _pipeline: &PipelineHandle,
        context: &Context,
    ) -> anyhow::Result<bool> {
        Ok(!self.skip_versions.contains(context.version()))
    }

    async fn run(
        &self,
        pipeline: &PipelineHandle,
        context: &Context,
        input: StepInput,
        _results: Arc<StepResults>,
    ) -> anyhow::Result<StepOutput> {
        let version = context.version();
        let outputs = self.output_paths(pipeline, version);
        let produced = || Arc::new(StepResults::with_keys(self.outputs.iter().cloned()));

        if !outputs.is_empty() && outputs.iter().all(|(_, path)| path.exists()) {
            debug!(step = %self.step, version = %version, "Outputs already present");
            return Ok(StepOutput::up_to_date(produced()));
        }

        for (_, path) in &outputs {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("cannot create '{}'", parent.display()))?;
            }
        }

        let predecessors: Vec<&str> = context.predecessors().iter().map(VersionId::as_str).collect();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&self.command);
        cmd.envs(self.config.iter());
        cmd.envs(&self.env);
        cmd.env("HISTFLOW_STEP", self.step.as_str());
        cmd.env("HISTFLOW_VERSION", version.as_str());
        cmd.env("HISTFLOW_PREDECESSORS", predecessors.join(","));
        if let Some(repository) = pipeline.repository().path() {
            cmd.env("HISTFLOW_REPOSITORY", repository);
        }
        for (key, path) in &outputs {
            cmd.env(format!("HISTFLOW_OUT_{}", key.env_suffix()), path);
        }
        for (key, path) in input.iter() {
            cmd.env(format!("HISTFLOW_IN_{}", key.env_suffix()), path);
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("shell '{}' may not be available", self.shell))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            anyhow::bail!("command exited with {}: {}", code, stderr.trim());
        }

        for (key, path) in &outputs {
            if !path.exists() {
                anyhow::bail!("command did not produce '{}' at '{}'", key, path.display());
            }
        }

        Ok(StepOutput::success(produced()))
    }
}
