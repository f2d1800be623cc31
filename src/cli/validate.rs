// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Validate command - report faults and warnings in the plan

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::load_plan;
use crate::database::ProviderRegistry;
use crate::errors::RecoverySuggestion;
use crate::pipeline::PlanValidator;
use crate::utils::{print_error, print_section, print_success, print_warning};

/// Run the validate command
pub async fn run(manifest: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating catalog...".bold());
    println!();

    let plan = load_plan(&manifest).await?;
    print_success(&format!("Loaded catalog '{}'", plan.catalog.name));

    let registry = ProviderRegistry::with_builtin_providers();
    let mut validation = PlanValidator::validate(&plan.pipelines);
    validation.merge(PlanValidator::validate_targets(
        &plan.pipelines,
        &plan.catalog.connections,
        |provider| registry.supports(provider),
    ));

    if !validation.errors.is_empty() {
        print_section(&"Errors".red().bold().to_string());
        for error in &validation.errors {
            print_error(error);
        }
    }

    if !validation.warnings.is_empty() {
        print_section(&"Warnings".yellow().bold().to_string());
        for warning in &validation.warnings {
            print_warning(warning);
        }
    }

    if verbose {
        print_section("Plan summary");
        for pipeline in &plan.pipelines {
            println!(
                "  {} ({} stages, {} scripts)",
                pipeline.name,
                pipeline.stages.len(),
                pipeline.script_count()
            );
        }

        let mut faults = Vec::new();
        for pipeline in &plan.pipelines {
            for (_, fault) in pipeline.faults() {
                if !faults.contains(&fault) {
                    faults.push(fault);
                }
            }
        }
        let mut suggestions: Vec<RecoverySuggestion> =
            faults.into_iter().filter_map(RecoverySuggestion::for_fault).collect();
        for pipeline in plan.pipelines.iter().filter(|p| p.connection.is_none()) {
            suggestions.push(RecoverySuggestion::declare_connection(&pipeline.name));
        }
        if !suggestions.is_empty() {
            print_section("Suggestions");
            for suggestion in &suggestions {
                println!("{}", suggestion);
            }
        }
    }

    println!();

    if validation.is_valid() {
        if validation.has_warnings() {
            println!("{}", "Plan is valid but has warnings.".yellow().bold());
        } else {
            println!("{}", "Plan is valid!".green().bold());
        }
        Ok(())
    } else {
        Err(miette::miette!(
            "Plan validation failed with {} error(s)",
            validation.errors.len()
        ))
    }
}
