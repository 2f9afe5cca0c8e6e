//! Runner configuration.
//!
//! [`MigrateOptions`] says where scripts live and which ledger to use;
//! [`DataSources`] maps logical store names to database connections.
//!
//! A datasource file looks like:
//!
//! ```toml
//! [datasources.db]
//! url = "sqlite:app.sqlite3"
//!
//! [datasources.reporting]
//! url = "sqlite:reporting.sqlite3"
//! max_connections = 2
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::catalog::DEFAULT_SUFFIX;
use crate::error::{MigrateError, Result};
use crate::ledger::DEFAULT_COLLECTION;

/// Default logical store name.
pub const DEFAULT_STORE: &str = "db";

/// Default root directory of migration scripts.
pub const DEFAULT_MIGRATIONS_ROOT: &str = "server/migrations";

/// Options for a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Logical store to migrate.
    pub store: String,
    /// Root directory; scripts for a store live in `<root>/<store>`.
    pub migrations_root: PathBuf,
    /// Lower bound on migration names; empty means no bound.
    pub since: String,
    /// Name of the ledger collection.
    pub collection: String,
    /// File suffix of migration scripts.
    pub suffix: String,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            store: DEFAULT_STORE.to_string(),
            migrations_root: PathBuf::from(DEFAULT_MIGRATIONS_ROOT),
            since: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl MigrateOptions {
    /// Directory holding the scripts of the configured store.
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.migrations_root.join(&self.store)
    }
}

fn default_max_connections() -> u32 {
    1
}

/// Connection settings of one datasource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataSourceConfig {
    /// SQLite connection URL.
    pub url: String,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Datasources known to the runner, keyed by store name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DataSources {
    #[serde(default)]
    datasources: BTreeMap<String, DataSourceConfig>,
}

impl DataSources {
    /// Parses a TOML datasource file body.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MigrateError::InvalidConfig(e.to_string()))
    }

    /// Reads a TOML datasource file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MigrateError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    /// Declares a single datasource.
    #[must_use]
    pub fn single(name: impl Into<String>, url: impl Into<String>) -> Self {
        let mut datasources = BTreeMap::new();
        datasources.insert(
            name.into(),
            DataSourceConfig {
                url: url.into(),
                max_connections: default_max_connections(),
            },
        );
        Self { datasources }
    }

    /// Returns the configured store names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.datasources.keys().map(String::as_str)
    }

    /// Looks up a datasource by store name.
    pub fn get(&self, name: &str) -> Result<&DataSourceConfig> {
        self.datasources
            .get(name)
            .ok_or_else(|| MigrateError::DataSourceNotFound(name.to_string()))
    }

    /// Opens a connection pool for the named datasource.
    ///
    /// Database files are created if missing.
    pub async fn connect(&self, name: &str) -> Result<SqlitePool> {
        let config = self.get(name)?;
        debug!(datasource = %name, url = %config.url, "Connecting");

        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;
        Ok(pool)
    }
}
