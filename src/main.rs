// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! sqlstage - staged SQL migrations
//!
//! Plan, validate and run SQL migration catalogs.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sqlstage::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so SQL output stays clean
    let default_filter = if cli.verbose { "sqlstage=debug" } else { "sqlstage=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Plan { manifest, format } => sqlstage::cli::plan::run(manifest, format, cli.verbose).await,
        Commands::Validate { manifest } => sqlstage::cli::validate::run(manifest, cli.verbose).await,
        Commands::Graph { manifest, format } => {
            sqlstage::cli::graph::run(manifest, format, cli.verbose).await
        }
        Commands::Migrate { manifest, pipeline } => {
            sqlstage::cli::migrate::run(manifest, pipeline, cli.verbose).await
        }
    }
}
