// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Migration pipelines
//!
//! Building turns enabled catalog scripts into pipelines of stages, steps
//! and ordered scripts, with structural problems recorded as faults.
//! Execution walks a built pipeline against a database connection.

mod batch;
mod builder;
mod cycle;
mod definition;
mod executor;
mod render;
mod resolver;
mod sorter;
mod validation;

pub use batch::{split_batches, BatchSplitter};
pub use builder::PipelineBuilder;
pub use cycle::{cycle_faults, find_cycles, CycleDetector, DependencyGraph};
pub use definition::*;
pub use executor::{MigrationExecutor, MigrationReport, StageReport};
pub use render::PlanGraph;
pub use resolver::{inline_references, resolve_all, resolve_declared, Resolution, ScriptIndex};
pub use sorter::{ScriptSorter, SortOutcome};
pub use validation::{PlanValidator, ValidationResult};
