// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Migrate command - run pipelines against their connections

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::load_plan;
use crate::database::ProviderRegistry;
use crate::pipeline::{MigrationExecutor, Pipeline};
use crate::utils::status;

/// Run the migrate command
///
/// Status goes to stderr so the `echo` provider's SQL owns stdout.
pub async fn run(manifest: PathBuf, only: Option<String>, verbose: bool) -> Result<()> {
    let plan = load_plan(&manifest).await?;

    let pipelines: Vec<&Pipeline> = match only {
        Some(ref name) => {
            let selected: Vec<&Pipeline> = plan.pipelines.iter().filter(|p| &p.name == name).collect();
            if selected.is_empty() {
                let known: Vec<&str> = plan.pipelines.iter().map(|p| p.name.as_str()).collect();
                return Err(miette::miette!(
                    "No pipeline named '{}' (known: {})",
                    name,
                    known.join(", ")
                ));
            }
            selected
        }
        None => plan.pipelines.iter().collect(),
    };

    let faulted: Vec<&&Pipeline> = pipelines.iter().filter(|p| p.has_faults()).collect();
    if !faulted.is_empty() {
        eprintln!("{}", "Refusing to migrate faulted pipelines:".red().bold());
        for pipeline in &faulted {
            for (location, fault) in pipeline.faults() {
                eprintln!("  {} {}: {}", "✗".red(), location, fault);
            }
        }
        return Err(miette::miette!(
            "{} pipeline(s) contain faults; run 'sqlstage validate -v' for suggestions",
            faulted.len()
        ));
    }

    let registry = ProviderRegistry::with_builtin_providers();
    let executor = MigrationExecutor::new(Arc::new(registry), plan.drive.clone())
        .with_connections(plan.catalog.connections.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; abandoning the running stage");
            trigger.cancel();
        }
    });

    for pipeline in pipelines {
        status(&format!("Migrating {}", pipeline.name.bold()));
        let report = executor.migrate_with_cancel(pipeline, cancel.clone()).await?;

        if verbose {
            for stage in &report.stages {
                status(&format!(
                    "{}: {} scripts, {} batches in {:.2}s",
                    stage.name,
                    stage.scripts,
                    stage.batches,
                    stage.duration.as_secs_f64()
                ));
            }
        }
        eprintln!(
            "  {} {} ({} scripts, {} batches, {:.2}s)",
            "✓".green(),
            report.pipeline.bold(),
            report.script_count(),
            report.batch_count(),
            report.duration.as_secs_f64()
        );
    }

    Ok(())
}
