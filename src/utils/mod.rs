// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Utility modules
//!
//! Common utilities for the sqlstage CLI.

pub mod colors;

pub use colors::*;
