// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 histflow contributors

//! Terminal color utilities
//!
//! Provides consistent color schemes across the CLI.

use colored::{ColoredString, Colorize};

use crate::pipeline::StepStatus;

/// Colored marker for a task outcome
pub fn status_marker(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::NotRun => "○".dimmed(),
        StepStatus::UpToDate => "✓".cyan(),
        StepStatus::Success => "✓".green(),
        StepStatus::Failed => "✗".red(),
    }
}

/// Colored label for a task outcome
pub fn status_label(status: StepStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        StepStatus::NotRun => label.dimmed(),
        StepStatus::UpToDate => label.cyan(),
        StepStatus::Success => label.green(),
        StepStatus::Failed => label.red(),
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.len().max(40)));
}

/// Print a styled section
pub fn print_section(title: &str) {
    println!();
    println!("{}:", title.bold());
}

/// Print a success check
pub fn print_success(msg: &str) {
    println!("  {} {}", "✓".green(), msg);
}

/// Print an error cross
pub fn print_error(msg: &str) {
    eprintln!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}
