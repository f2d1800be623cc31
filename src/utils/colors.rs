// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Terminal color utilities
//!
//! Consistent styling for plan and validation output. `colored` honours
//! `NO_COLOR` on its own.

use colored::{ColoredString, Colorize};

use crate::catalog::Tag;

/// Style a step tag; transactional steps stand out from the bare ones
pub fn tag_label(tag: Tag) -> ColoredString {
    let label = format!("[{}]", tag);
    match tag {
        Tag::PreTransaction | Tag::PostTransaction => label.magenta(),
        Tag::Pre | Tag::Pos => label.cyan(),
        Tag::Main => label.blue().bold(),
    }
}

/// Print a styled header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "═".repeat(title.chars().count().max(40)));
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
    println!("  {} {}", "✗".red(), msg);
}

/// Print a warning
pub fn print_warning(msg: &str) {
    println!("  {} {}", "⚠".yellow(), msg);
}

/// Print a status line to stderr, keeping stdout for SQL
pub fn status(msg: &str) {
    eprintln!("  {} {}", "→".blue(), msg);
}
