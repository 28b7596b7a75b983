// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Step outcomes and accumulated results

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Outcome of a step, ordered `NotRun < UpToDate < Success < Failed`
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    NotRun,
    UpToDate,
    Success,
    Failed,
}

impl StepStatus {
    /// Merge a collection of statuses: the maximum, or `NotRun` when empty
    pub fn merge(statuses: impl IntoIterator<Item = StepStatus>) -> StepStatus {
        statuses.into_iter().max().unwrap_or_default()
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Whether the run may continue past this outcome
    pub fn is_ok(self) -> bool {
        !self.is_failure()
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRun => write!(f, "not run"),
            Self::UpToDate => write!(f, "up to date"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Opaque name of a producible artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(Arc<str>);

impl StorageKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Upper-cased, underscore-separated form for environment variables
    pub fn env_suffix(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

/// Artifacts produced so far for one version.
///
/// Grows monotonically; shared between concurrently running workers.
#[derive(Debug, Default)]
pub struct StepResults {
    keys: RwLock<BTreeSet<StorageKey>>,
}

impl StepResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(keys: impl IntoIterator<Item = StorageKey>) -> Self {
        Self {
            keys: RwLock::new(keys.into_iter().collect()),
        }
    }

    /// Record a produced artifact; returns `false` if it was already present
    pub fn add(&self, key: impl Into<StorageKey>) -> bool {
        self.keys.write().insert(key.into())
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.keys.read().contains(key)
    }

    /// Snapshot of the keys in order
    pub fn keys(&self) -> Vec<StorageKey> {
        self.keys.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }

    /// Union `other` into this set
    pub fn merge_from(&self, other: &StepResults) {
        if std::ptr::eq(self, other) {
            return;
        }
        let incoming = other.keys();
        self.keys.write().extend(incoming);
    }
}

/// Status and results contributed by one step run
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub status: StepStatus,
    pub results: Arc<StepResults>,
}

impl StepOutput {
    pub fn new(status: StepStatus, results: Arc<StepResults>) -> Self {
        Self { status, results }
    }

    pub fn success(results: Arc<StepResults>) -> Self {
        Self::new(StepStatus::Success, results)
    }

    pub fn up_to_date(results: Arc<StepResults>) -> Self {
        Self::new(StepStatus::UpToDate, results)
    }

    /// `NotRun` with no results
    pub fn not_run() -> Self {
        Self::new(StepStatus::NotRun, Arc::new(StepResults::new()))
    }

    /// Merge outputs: maximum status, union of results
    pub fn merge(outputs: impl IntoIterator<Item = StepOutput>) -> StepOutput {
        let results = StepResults::new();
        let mut status = StepStatus::NotRun;
        for output in outputs {
            status = status.max(output.status);
            results.merge_from(&output.results);
        }
        StepOutput::new(status, Arc::new(results))
    }
}
