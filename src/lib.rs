// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! # sqlstage - staged SQL migrations
//!
//! `sqlstage` runs SQL migration scripts organised into products, modules
//! and packages, in a deterministic order and with per-stage transactions.
//!
//! ## Features
//!
//! - **Deterministic plans** - precedence, dependencies and tag suffixes decide order
//! - **Faults as data** - cycles and unresolved dependencies are reported, never thrown
//! - **Stage transactions** - one connection and one transaction per stage
//! - **Batch splitting** - scripts split on `GO`-style separator lines
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the execution plan
//! sqlstage plan
//!
//! # Check for cycles and unresolved dependencies
//! sqlstage validate
//!
//! # Run every pipeline
//! sqlstage migrate
//! ```

pub mod catalog;
pub mod cli;
pub mod database;
pub mod errors;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use catalog::{Catalog, Drive, FsDrive, MemoryDrive, NodePath, Tag};
pub use errors::{SqlstageError, SqlstageResult};
pub use pipeline::{Fault, MigrationExecutor, Pipeline, PipelineBuilder, Stage, Step};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
