//! Ledger of applied migrations.
//!
//! The ledger holds one [`MigrationRecord`] per migration that has been
//! applied and not reverted. Only the executor creates or deletes records,
//! and it does so right after the corresponding script succeeds.

mod memory;
mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Default name of the ledger collection (table).
pub const DEFAULT_COLLECTION: &str = "Migration";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    /// Script file name; primary key.
    pub name: String,
    /// Logical store the migration was applied to.
    pub store: String,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

impl MigrationRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn now(name: impl Into<String>, store: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: store.into(),
            applied_at: Utc::now(),
        }
    }
}

/// Direction of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply outstanding migrations, oldest first.
    Up,
    /// Revert applied migrations, newest first.
    Down,
}

impl Direction {
    /// Ledger ordering used when resolving this direction.
    #[must_use]
    pub const fn order(self) -> SortOrder {
        match self {
            Self::Up => SortOrder::Ascending,
            Self::Down => SortOrder::Descending,
        }
    }

    /// Lowercase name, also the script entry point.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering of ledger query results by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// `name ASC`
    Ascending,
    /// `name DESC`
    Descending,
}

impl SortOrder {
    /// SQL keyword for this ordering.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Persistence for [`MigrationRecord`]s.
///
/// Implementations are expected to acknowledge a write only once it is
/// durable; the executor starts the next script only after that.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates the ledger collection if it does not exist.
    async fn ensure_schema(&self) -> Result<()>;

    /// Returns records with `name >= since`, ordered by name.
    ///
    /// An empty `since` matches every record.
    async fn query_since(&self, since: &str, order: SortOrder) -> Result<Vec<MigrationRecord>>;

    /// Inserts a record.
    async fn insert(&self, record: &MigrationRecord) -> Result<()>;

    /// Deletes every record with the given name, returning how many were removed.
    async fn delete_by_name(&self, name: &str) -> Result<u64>;
}
