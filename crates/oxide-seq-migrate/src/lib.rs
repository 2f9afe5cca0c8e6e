//! Sequential, ledger-tracked migrations for Rust.
//!
//! `oxide-seq-migrate` discovers timestamp-named migration scripts, compares
//! them with a ledger of applied migrations stored next to the data, and runs
//! the outstanding ones strictly one at a time:
//! - `up` applies every script without a ledger record, oldest first
//! - `down` reverts every recorded script, newest first
//! - a run stops at the first failure; earlier steps stay recorded
//!
//! # Architecture
//!
//! - **Catalog** - Lists the scripts present on disk (or registered in code)
//! - **Ledger** - Persists one record per applied migration
//! - **Resolver** - Diffs catalog and ledger into an ordered work list
//! - **Executor** - Runs the work list and updates the ledger after each step
//! - **Writer** - Creates new timestamped script files
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_seq_migrate::prelude::*;
//!
//! let pool = DataSources::single("db", "sqlite:app.sqlite3").connect("db").await?;
//! let executor = MigrationExecutor::new(
//!     "db",
//!     pool.clone(),
//!     SqliteLedger::new(pool, DEFAULT_COLLECTION)?,
//!     DirectoryCatalog::new("server/migrations/db"),
//!     SqlFileLoader::new("server/migrations/db"),
//! );
//!
//! let report = executor.up("").await?;
//! println!("applied {} migrations", report.migrations.len());
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create server/migrations/db/<timestamp>-add_users.sql
//! oxide-seq-migrate create add_users
//!
//! # Apply outstanding migrations
//! oxide-seq-migrate up
//!
//! # Revert everything applied since a date
//! oxide-seq-migrate --since 20240101 down
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod resolver;
pub mod script;
pub mod sql;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::catalog::{DirectoryCatalog, ScriptCatalog};
    pub use crate::config::{DataSourceConfig, DataSources, MigrateOptions};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{MigrationExecutor, MigrationStatus, RunReport};
    pub use crate::ledger::{
        Direction, LedgerStore, MemoryLedger, MigrationRecord, SortOrder, SqliteLedger,
        DEFAULT_COLLECTION,
    };
    pub use crate::resolver::resolve;
    pub use crate::script::{MigrationScript, ScriptLoader, ScriptRegistry};
    pub use crate::sql::{SqlFileLoader, SqlScript};
    pub use crate::writer::{generate_migration_name, MigrationWriter};
}

/// Builds an executor over SQL files for the store described by `options`.
///
/// Scripts are read from [`config::MigrateOptions::store_dir`] and the ledger
/// lives in the same database as the data.
pub fn sql_executor(
    options: &config::MigrateOptions,
    pool: sqlx::sqlite::SqlitePool,
) -> error::Result<executor::MigrationExecutor<sqlx::sqlite::SqlitePool, ledger::SqliteLedger>> {
    let dir = options.store_dir();
    let ledger = ledger::SqliteLedger::new(pool.clone(), &options.collection)?;
    let catalog = catalog::DirectoryCatalog::new(&dir).with_suffix(options.suffix.clone());
    Ok(executor::MigrationExecutor::new(
        options.store.clone(),
        pool,
        ledger,
        catalog,
        sql::SqlFileLoader::new(dir),
    ))
}
