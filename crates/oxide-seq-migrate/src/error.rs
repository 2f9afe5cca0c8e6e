//! Error types for the migration runner.

use std::path::PathBuf;

use crate::ledger::Direction;

/// Errors that can occur while resolving, running or creating migrations.
///
/// Every variant is fatal to a run: the executor stops at the first error and
/// never starts another script.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The requested datasource is not configured.
    #[error("datasource '{0}' not found")]
    DataSourceNotFound(String),

    /// Configuration could not be read or is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The ledger could not be prepared or queried.
    #[error("Error retrieving migrations: {0}")]
    LedgerAccess(#[source] Box<MigrateError>),

    /// A migration script reported a failure.
    #[error("Migration '{name}' failed while running {direction}: {source:#}")]
    ScriptFailed {
        /// Migration name.
        name: String,
        /// Direction that was being run.
        direction: Direction,
        /// Error reported by the script.
        #[source]
        source: anyhow::Error,
    },

    /// A migration could not be loaded as a runnable script.
    #[error("Error loading migration '{name}': {message}")]
    ScriptLoad {
        /// Migration name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// The script ran but its ledger record could not be written.
    ///
    /// The script's effects are in place and unrecorded; this needs manual
    /// reconciliation.
    #[error("Error saving migration '{name}' to the ledger: {source}")]
    LedgerWrite {
        /// Migration name.
        name: String,
        /// Underlying ledger error.
        #[source]
        source: Box<MigrateError>,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// Ledger backend failure that is not a database error.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (listing, reading or writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Returns the name of the migration this error concerns, if any.
    #[must_use]
    pub fn migration(&self) -> Option<&str> {
        match self {
            Self::ScriptFailed { name, .. }
            | Self::ScriptLoad { name, .. }
            | Self::LedgerWrite { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
