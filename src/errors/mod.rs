// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 sqlstage contributors

//! Error types
//!
//! Structural problems found while planning (cycles, unresolved
//! dependencies) are never errors; they are recorded as
//! [`Fault`](crate::pipeline::Fault) values on the plan. Everything in
//! this module is fatal to the operation that raised it.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::Tag;

/// Result type for sqlstage operations
pub type SqlstageResult<T> = Result<T, SqlstageError>;

/// Main error type for sqlstage
#[derive(Error, Debug, Diagnostic)]
pub enum SqlstageError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("No script source (drive) has been registered")]
    #[diagnostic(
        code(sqlstage::drive_not_registered),
        help("Register a drive with `PipelineBuilder::with_drive` before resolving dependencies")
    )]
    DriveNotRegistered,

    #[error("Pipeline '{pipeline}' has no usable connection{}", wanted(.connection))]
    #[diagnostic(
        code(sqlstage::connection_not_found),
        help("Declare the connection in the manifest or mark one connection as `default: true`")
    )]
    ConnectionNotFound {
        pipeline: String,
        connection: Option<String>,
    },

    #[error("Database provider '{provider}' is not supported")]
    #[diagnostic(code(sqlstage::provider_not_supported))]
    ProviderNotSupported {
        provider: String,
        #[help]
        help: Option<String>,
    },

    #[error("Manifest file not found: {path}")]
    #[diagnostic(
        code(sqlstage::manifest_not_found),
        help("Pass the catalog manifest with --manifest or create sqlstage.yaml")
    )]
    ManifestNotFound { path: PathBuf },

    #[error("Invalid manifest: {reason}")]
    #[diagnostic(code(sqlstage::invalid_manifest))]
    InvalidManifest {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Invalid batch separator '{separator}': {reason}")]
    #[diagnostic(code(sqlstage::invalid_separator))]
    InvalidSeparator { separator: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Script not found: {path}")]
    #[diagnostic(
        code(sqlstage::script_not_found),
        help("Check the script path in the manifest against the catalog root")
    )]
    ScriptNotFound { path: String },

    #[error("Failed to read script '{path}': {error}")]
    #[diagnostic(code(sqlstage::script_read_error))]
    ScriptReadError { path: String, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{stage}: could not open connection '{connection}': {error}")]
    #[diagnostic(code(sqlstage::connection_failed))]
    ConnectionFailed {
        stage: String,
        connection: String,
        error: String,
    },

    #[error("{stage} / {tag} / {script}: cannot read script: {error}")]
    #[diagnostic(
        code(sqlstage::script_unavailable),
        help("Check the script path in the manifest against the catalog root")
    )]
    ScriptUnavailable {
        stage: String,
        tag: Tag,
        script: String,
        error: String,
    },

    #[error("{stage}: transaction {operation} failed: {error}")]
    #[diagnostic(code(sqlstage::transaction_failed))]
    TransactionFailed {
        stage: String,
        operation: &'static str,
        error: String,
    },

    #[error("{stage} / {tag} / {script}: batch {batch} failed: {error}")]
    #[diagnostic(
        code(sqlstage::batch_failed),
        help("Stages committed before the failing one remain committed; fix the script and re-run")
    )]
    BatchFailed {
        stage: String,
        tag: Tag,
        script: String,
        batch: usize,
        error: String,
    },

    #[error("Database error: {message}")]
    #[diagnostic(code(sqlstage::database_error))]
    Database { message: String },

    #[error("Migration cancelled during {stage}")]
    #[diagnostic(code(sqlstage::cancelled))]
    Cancelled { stage: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(sqlstage::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(sqlstage::yaml_error))]
    Yaml { message: String },

    #[error("JSON error: {message}")]
    #[diagnostic(code(sqlstage::json_error))]
    Json { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(sqlstage::glob_error))]
    GlobPattern { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(sqlstage::internal))]
    Internal { message: String },
}

fn wanted(connection: &Option<String>) -> String {
    connection
        .as_ref()
        .map(|c| format!(" (wanted '{}')", c))
        .unwrap_or_default()
}

impl From<std::io::Error> for SqlstageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for SqlstageError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for SqlstageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<glob::PatternError> for SqlstageError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl SqlstageError {
    /// Create a database error from any displayable driver error
    pub fn database(error: impl std::fmt::Display) -> Self {
        Self::Database {
            message: error.to_string(),
        }
    }

    /// Create an unsupported provider error listing the built-in providers
    pub fn provider_not_supported(provider: &str) -> Self {
        Self::ProviderNotSupported {
            provider: provider.to_string(),
            help: Some(format!(
                "Built-in providers: {}. Other databases are driven by registering a \
                 ConnectionFactory when embedding sqlstage as a library.",
                crate::database::BUILTIN_PROVIDERS.join(", ")
            )),
        }
    }

    /// Whether this error is a configuration problem rather than a runtime failure
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DriveNotRegistered
                | Self::ConnectionNotFound { .. }
                | Self::ProviderNotSupported { .. }
                | Self::ManifestNotFound { .. }
                | Self::InvalidManifest { .. }
                | Self::InvalidSeparator { .. }
        )
    }

    /// Stage name carried by execution failures
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailed { stage, .. }
            | Self::ScriptUnavailable { stage, .. }
            | Self::TransactionFailed { stage, .. }
            | Self::BatchFailed { stage, .. }
            | Self::Cancelled { stage } => Some(stage),
            _ => None,
        }
    }
}
