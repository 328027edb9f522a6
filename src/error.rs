//! Error taxonomy for a sync run.
//!
//! Only [`SyncError::Setup`], [`SyncError::Connection`] and
//! [`SyncError::Scan`] / [`SyncError::EmptyScan`] abort a run. Every other variant is caught at
//! the boundary of the step that produced it, logged, and counted in the
//! run summary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A client for an external collaborator could not be built.
    #[error("failed to set up {what}: {cause:#}")]
    Setup {
        what: &'static str,
        cause: anyhow::Error,
    },

    /// The destination store could not be reached at startup.
    #[error("failed to connect to destination store '{url}': {cause:#}")]
    Connection { url: String, cause: anyhow::Error },

    /// The tree scan request failed.
    #[error("tree scan failed: {cause:#}")]
    Scan { cause: anyhow::Error },

    /// The tree scan succeeded but produced no candidate documents.
    #[error("tree scan of {repo} returned no candidate documents")]
    EmptyScan { repo: String },

    /// One document's fragment could not be fetched or parsed.
    #[error("fetch failed for {path}: {cause:#}")]
    Fetch { path: String, cause: anyhow::Error },

    /// A schema definition statement failed for a table.
    #[error("schema sync failed for table '{table}': {cause:#}")]
    SchemaSync { table: String, cause: anyhow::Error },

    /// A table or column name from a fragment cannot be used as an identifier.
    #[error("invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    /// The row write failed.
    #[error("upsert failed for {path} in table '{table}': {cause:#}")]
    Upsert {
        table: String,
        path: String,
        cause: anyhow::Error,
    },
}

impl SyncError {
    /// Whether this error terminates the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Setup { .. }
                | SyncError::Connection { .. }
                | SyncError::Scan { .. }
                | SyncError::EmptyScan { .. }
        )
    }

    /// Short class name used in logs and the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Setup { .. } => "setup",
            SyncError::Connection { .. } => "connection",
            SyncError::Scan { .. } | SyncError::EmptyScan { .. } => "scan",
            SyncError::Fetch { .. } => "fetch",
            SyncError::SchemaSync { .. } | SyncError::InvalidIdentifier { .. } => "schema",
            SyncError::Upsert { .. } => "upsert",
        }
    }
}
