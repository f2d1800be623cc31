// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Plan command - print pipelines, stages, steps and scripts

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use super::{load_plan, PlanFormat};
use crate::pipeline::Pipeline;
use crate::utils::{print_header, tag_label};

/// Run the plan command
pub async fn run(manifest: PathBuf, format: PlanFormat, verbose: bool) -> Result<()> {
    let plan = load_plan(&manifest).await?;

    match format {
        PlanFormat::Json => {
            let json = serde_json::to_string_pretty(&plan.pipelines).into_diagnostic()?;
            println!("{}", json);
        }
        PlanFormat::Text => {
            if plan.pipelines.is_empty() {
                println!("{}", "No enabled scripts in catalog.".yellow());
            }
            for pipeline in &plan.pipelines {
                print_pipeline(pipeline, verbose);
            }
        }
    }

    Ok(())
}

fn print_pipeline(pipeline: &Pipeline, verbose: bool) {
    let target = pipeline.connection.as_deref().unwrap_or("no connection");
    print_header(&format!("{} → {}", pipeline.name, target));

    for stage in &pipeline.stages {
        let marker = if stage.has_faults() { "✗".red() } else { "✓".green() };
        println!(
            "{} {} {}",
            marker,
            stage.name.bold(),
            format!("(module {}, package {})", stage.module_precedence, stage.package_precedence).dimmed()
        );
        for fault in &stage.faults {
            println!("    {}", fault.to_string().red());
        }

        for step in &stage.steps {
            println!("  {}", tag_label(step.tag));
            for script in &step.scripts {
                let id = if script.has_faults() {
                    script.id().red()
                } else {
                    script.id().normal()
                };
                println!("    {}", id);
                if verbose {
                    println!("      {}", script.entry.drive_path.dimmed());
                    if !script.dependencies.is_empty() {
                        println!("      {}", format!("depends: {}", script.dependencies.join(", ")).dimmed());
                    }
                }
                for fault in &script.faults {
                    println!("      {}", fault.to_string().red());
                }
            }
        }
    }

    println!();
}
