// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Script sources
//!
//! A drive resolves drive-relative script paths to text.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use super::model::normalize_path;
use crate::errors::{SqlstageError, SqlstageResult};

/// Source of script text
#[async_trait]
pub trait Drive: Send + Sync {
    /// Read the full text at a drive-relative path
    ///
    /// Fails with [`SqlstageError::ScriptNotFound`] when the path is absent.
    async fn read_text(&self, path: &str) -> SqlstageResult<String>;
}

/// Drive backed by a directory on disk
#[derive(Debug, Clone)]
pub struct FsDrive {
    root: PathBuf,
}

impl FsDrive {
    /// Create a drive rooted at a directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this drive
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl Drive for FsDrive {
    async fn read_text(&self, path: &str) -> SqlstageResult<String> {
        let full = self.root.join(normalize_path(path));

        tokio::fs::read_to_string(&full).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SqlstageError::ScriptNotFound {
                path: path.to_string(),
            },
            _ => SqlstageError::ScriptReadError {
                path: path.to_string(),
                error: e.to_string(),
            },
        })
    }
}

/// Drive holding scripts in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDrive {
    files: HashMap<String, String>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, builder style
    pub fn with_file(mut self, path: &str, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: &str, text: impl Into<String>) {
        self.files.insert(normalize_path(path), text.into());
    }
}

#[async_trait]
impl Drive for MemoryDrive {
    async fn read_text(&self, path: &str) -> SqlstageResult<String> {
        self.files
            .get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| SqlstageError::ScriptNotFound {
                path: path.to_string(),
            })
    }
}
