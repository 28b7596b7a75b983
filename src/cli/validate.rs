// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Validate command - check pipeline configuration

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::load_pipeline;
use crate::utils::{print_error, print_section, print_success, print_warning};

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let file = match load_pipeline(&pipeline_path) {
        Ok(file) => file,
        Err(e) => {
            print_error("Failed to parse pipeline");
            eprintln!();
            return Err(e);
        }
    };

    print_success("Pipeline file is valid YAML");

    let mut warnings = Vec::new();
    for step in &file.steps {
        if which::which(&step.shell).is_err() {
            warnings.push(format!(
                "Step '{}': shell '{}' was not found on PATH",
                step.name, step.shell
            ));
        }
    }

    let summary: Vec<String> = file
        .steps
        .iter()
        .map(|step| {
            let mut deps: Vec<String> = step.requires.clone();
            deps.extend(step.after.iter().map(|s| format!("{}?", s)));
            deps.extend(step.inter_version.iter().map(|s| format!("{}@prev", s)));
            let deps = if deps.is_empty() {
                String::new()
            } else {
                format!(" [depends: {}]", deps.join(", "))
            };
            format!("{} ({}){}", step.name, step.parallelism, deps.dimmed())
        })
        .collect();
    let name = file.name.clone();

    let description = match file.into_description() {
        Ok(description) => description,
        Err(e) => {
            print_error(&e.to_string());
            eprintln!();
            return Err(e.into());
        }
    };
    print_success("Step dependencies are well-formed");

    warnings.extend(description.validate()?.warnings);

    if !warnings.is_empty() {
        print_section(&"Warnings".yellow().bold().to_string());
        for warning in &warnings {
            print_warning(warning);
        }
    }

    if verbose {
        print_section("Pipeline summary");
        println!("  Name: {}", name);
        println!("  Steps: {}", summary.len());
        for line in &summary {
            println!("    - {}", line);
        }
    }

    println!();
    if warnings.is_empty() {
        println!("{}", "Pipeline is valid!".green().bold());
    } else {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
    }

    Ok(())
}
