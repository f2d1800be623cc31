// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Script catalogs
//!
//! Products, versions, modules, packages and scripts as loaded from a
//! manifest, the drives their text is read from, and node selection for
//! the pipeline builder.

mod drive;
mod model;
mod select;

pub use drive::{Drive, FsDrive, MemoryDrive};
pub use model::*;
pub use select::{NodePath, ScriptEntry};
