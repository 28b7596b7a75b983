// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Pipeline validation
//!
//! Validation is fail-fast: the first structural problem is returned as an
//! error. Problems the engine can tolerate are collected as warnings.

use std::collections::HashSet;

use crate::errors::FlowError;
use crate::pipeline::PipelineDescription;

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline description
    pub fn validate(description: &PipelineDescription) -> Result<ValidationReport, FlowError> {
        let mut report = ValidationReport::new();

        if description.steps().is_empty() {
            return Err(FlowError::EmptyPipeline);
        }

        // Check for duplicate steps
        let mut seen = HashSet::new();
        for step in description.steps() {
            if !seen.insert(step.name()) {
                return Err(FlowError::DuplicateStep {
                    step: step.name().to_string(),
                });
            }
        }

        for (position, step) in description.steps().iter().enumerate() {
            let name = step.name();
            let dependencies = description.dependencies(name);

            for (dependency, relation) in dependencies.intra() {
                if dependency == name {
                    return Err(FlowError::SelfDependency {
                        step: name.to_string(),
                    });
                }

                match description.position(dependency) {
                    None if relation.is_required() => {
                        return Err(FlowError::MissingRequiredDependency {
                            step: name.to_string(),
                            dependency: dependency.to_string(),
                        });
                    }
                    None => {
                        report.add_warning(&format!(
                            "Step '{}': optional dependency '{}' is not part of the pipeline",
                            name, dependency
                        ));
                    }
                    Some(dep_position) if dep_position > position => {
                        return Err(FlowError::ForwardDependency {
                            step: name.to_string(),
                            dependency: dependency.to_string(),
                        });
                    }
                    Some(_) => {}
                }
            }

            for dependency in dependencies.inter() {
                if !description.contains(dependency) {
                    report.add_warning(&format!(
                        "Step '{}': inter-version dependency '{}' is not part of the pipeline",
                        name, dependency
                    ));
                }
            }
        }

        // Declarations for steps that never run
        let mut orphans: Vec<_> = description
            .declared_dependencies()
            .map(|(step, _)| step)
            .filter(|step| !description.contains(step))
            .collect();
        orphans.sort();
        for step in orphans {
            report.add_warning(&format!(
                "Dependencies declared for step '{}', which is not part of the pipeline",
                step
            ));
        }

        Ok(report)
    }
}

/// Non-fatal findings of a successful validation
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
