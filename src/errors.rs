//! Typed error hierarchy for the mining pipeline.
//!
//! Three top-level enums cover the three subsystems:
//! - `TableError`: frame column access and columnar persistence failures
//! - `LoadError`: artifact write, compile, and entry-point resolution failures
//! - `LedgerError`: audit ledger creation and append failures
//!
//! Execution failures inside a loaded artifact are deliberately *not* errors:
//! the runner reports them as `ExecutionOutcome` values so the repair loop can
//! hand the diagnostic back to the collaborator.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from frame operations and columnar file IO.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Column '{column}' has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to read table at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write table at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed columnar file at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from persisting and binding a generated artifact.
///
/// The loader writes the artifact file before compiling it, so the compile
/// and entry-point variants carry the name and path that were already
/// assigned. The orchestrator needs both to pin repairs to the same file
/// and to clean up after abandonment.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Generated code text is empty after cleaning")]
    EmptySource,

    #[error("Failed to write artifact {unique_name} at {path}: {source}")]
    WriteFailed {
        unique_name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact {unique_name} did not compile: {message}")]
    Compile {
        unique_name: String,
        path: PathBuf,
        message: String,
    },

    #[error("No function named '{logical_name}' (and no other function) in artifact {unique_name}")]
    MissingEntryPoint {
        logical_name: String,
        unique_name: String,
        path: PathBuf,
    },
}

impl LoadError {
    /// The unique name assigned before the failure, if one was assigned.
    pub fn assigned_name(&self) -> Option<&str> {
        match self {
            LoadError::EmptySource => None,
            LoadError::WriteFailed { unique_name, .. }
            | LoadError::Compile { unique_name, .. }
            | LoadError::MissingEntryPoint { unique_name, .. } => Some(unique_name),
        }
    }

    /// The storage path of the artifact file, if one was written.
    pub fn storage_path(&self) -> Option<&Path> {
        match self {
            LoadError::EmptySource | LoadError::WriteFailed { .. } => None,
            LoadError::Compile { path, .. } | LoadError::MissingEntryPoint { path, .. } => {
                Some(path)
            }
        }
    }
}

/// Errors from the append-only audit ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to create ledger at {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to ledger at {path}: {source}")]
    AppendFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
