//! Error types for the automation engine.
//!
//! `AutomationError` covers everything the automation surface can report.
//! `BatchError` is what a whole run fails with; per-item failures never
//! become a `BatchError`.
//!
//! CHANGELOG:
//! - 10/02/2026 - Initial implementation

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an [`AutomationSurface`](crate::surface::AutomationSurface).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is detached from the tree: {0}")]
    ElementDetached(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),
}

impl AutomationError {
    /// True for lookups that simply came back empty.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_) | AutomationError::ElementDetached(_)
        )
    }
}

/// Errors reading or writing a contact table / outcome log.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Failed to read table {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write table {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Table {path:?} has no header row")]
    MissingHeader { path: PathBuf },

    #[error("Table {path:?} is missing required columns: {}", missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },
}

/// Run-aborting failures.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Chat window '{name}' not found within {timeout_ms} ms: {source}")]
    WindowNotFound {
        name: String,
        timeout_ms: u64,
        #[source]
        source: AutomationError,
    },

    #[error("Failed to open {what}: {source}")]
    Navigation {
        what: &'static str,
        #[source]
        source: AutomationError,
    },

    #[error(transparent)]
    Surface(#[from] AutomationError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Invalid file name template '{template}': {reason}")]
    FilenameTemplate { template: String, reason: String },
}
