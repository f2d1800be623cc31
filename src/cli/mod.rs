// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for sqlstage.

pub mod graph;
pub mod migrate;
pub mod plan;
pub mod validate;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::catalog::{Catalog, FsDrive};
use crate::errors::SqlstageResult;
use crate::pipeline::{Pipeline, PipelineBuilder};

/// Default manifest file name
pub const DEFAULT_MANIFEST: &str = "sqlstage.yaml";

/// Staged SQL migration runner
///
/// Plans and runs SQL scripts grouped into products, modules and packages.
#[derive(Parser, Debug)]
#[clap(
    name = "sqlstage",
    version,
    about = "Ordered, transactional SQL migrations for product catalogs",
    long_about = None,
    after_help = "Examples:\n\
        sqlstage plan                   Show the execution plan\n\
        sqlstage validate               Report cycles and unresolved dependencies\n\
        sqlstage graph --format dot     Render script dependencies for Graphviz\n\
        sqlstage migrate                Run every pipeline\n\n\
        See 'sqlstage <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and print the execution plan
    Plan {
        /// Catalog manifest
        #[clap(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text", value_enum)]
        format: PlanFormat,
    },

    /// Report faults and warnings in the plan
    Validate {
        /// Catalog manifest
        #[clap(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,
    },

    /// Show script dependencies as a graph
    Graph {
        /// Catalog manifest
        #[clap(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text", value_enum)]
        format: GraphFormat,
    },

    /// Run pipelines against their connections
    Migrate {
        /// Catalog manifest
        #[clap(short, long, default_value = DEFAULT_MANIFEST)]
        manifest: PathBuf,

        /// Run only this pipeline (`<product> - <version>`)
        #[clap(short, long)]
        pipeline: Option<String>,
    },
}

/// Output format for the plan command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    Text,
    Json,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// A manifest loaded and built into pipelines
pub struct LoadedPlan {
    pub catalog: Catalog,
    pub drive: Arc<FsDrive>,
    pub pipelines: Vec<Pipeline>,
}

/// Load a manifest, resolve dependencies through its directory and build
pub async fn load_plan(manifest: &Path) -> SqlstageResult<LoadedPlan> {
    let catalog = Catalog::from_file(manifest)?;

    let base_dir = match manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let drive = Arc::new(FsDrive::new(base_dir));
    debug!(manifest = %manifest.display(), root = %drive.root().display(), "Loaded catalog");

    let mut builder = PipelineBuilder::new().with_drive(drive.clone());
    builder.add_catalog(&catalog);
    builder.resolve_dependencies().await?;
    let pipelines = builder.build_pipelines();

    Ok(LoadedPlan {
        catalog,
        drive,
        pipelines,
    })
}
