// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Step dependency declarations
//!
//! A step depends on other steps either within the same version
//! (intra-version) or on a step's task for the predecessor versions
//! (inter-version).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::FlowError;
use crate::pipeline::StepName;

/// How strongly one step depends on another
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyRelation {
    #[default]
    None,
    /// Orders execution and must be present in the description
    Required,
    /// Orders execution when present; tolerated when absent
    NotRequired,
}

impl DependencyRelation {
    /// Whether the relation gates execution order
    pub fn is_dependency(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn is_required(self) -> bool {
        matches!(self, Self::Required)
    }
}

/// Dependencies declared by a single step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDependencies {
    intra: BTreeMap<StepName, DependencyRelation>,
    inter: BTreeSet<StepName>,
    conflicts: BTreeSet<StepName>,
}

impl StepDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an intra-version dependency with an explicit relation.
    ///
    /// Declaring the same step again with a different relation keeps the
    /// first relation and records a conflict that `merge` reports.
    pub fn depends_on(mut self, step: impl Into<StepName>, relation: DependencyRelation) -> Self {
        let step = step.into();
        match self.intra.get(&step) {
            Some(existing) if *existing != relation => {
                self.conflicts.insert(step);
            }
            _ => {
                self.intra.insert(step, relation);
            }
        }
        self
    }

    pub fn requires(self, step: impl Into<StepName>) -> Self {
        self.depends_on(step, DependencyRelation::Required)
    }

    pub fn after(self, step: impl Into<StepName>) -> Self {
        self.depends_on(step, DependencyRelation::NotRequired)
    }

    /// Declare a dependency on `step`'s task for every predecessor version
    pub fn inter_version(mut self, step: impl Into<StepName>) -> Self {
        self.inter.insert(step.into());
        self
    }

    /// Relation to `step` within the same version
    pub fn relation(&self, step: &StepName) -> DependencyRelation {
        self.intra.get(step).copied().unwrap_or_default()
    }

    /// Intra-version dependencies that gate execution
    pub fn intra(&self) -> impl Iterator<Item = (&StepName, DependencyRelation)> {
        self.intra
            .iter()
            .filter(|(_, relation)| relation.is_dependency())
            .map(|(step, relation)| (step, *relation))
    }

    pub fn inter(&self) -> impl Iterator<Item = &StepName> {
        self.inter.iter()
    }

    /// First step declared with two different relations, if any
    pub fn conflict(&self) -> Option<&StepName> {
        self.conflicts.iter().next()
    }

    pub fn is_empty(&self) -> bool {
        self.intra().next().is_none() && self.inter.is_empty()
    }

    /// Union of two declarations for `owner`.
    ///
    /// Fails when both sides name the same step with different relations.
    pub fn merge(mut self, other: StepDependencies, owner: &StepName) -> Result<Self, FlowError> {
        if let Some(step) = self.conflict().or_else(|| other.conflict()) {
            return Err(FlowError::ConflictingDependency {
                step: owner.to_string(),
                dependency: step.to_string(),
            });
        }
        for (step, relation) in other.intra {
            match self.intra.get(&step) {
                Some(existing) if *existing != relation => {
                    return Err(FlowError::ConflictingDependency {
                        step: owner.to_string(),
                        dependency: step.to_string(),
                    });
                }
                _ => {
                    self.intra.insert(step, relation);
                }
            }
        }
        self.inter.extend(other.inter);
        Ok(self)
    }
}
