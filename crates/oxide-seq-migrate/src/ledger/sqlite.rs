//! SQLite-backed ledger.
//!
//! The ledger table lives in the migrated database itself, so each datasource
//! carries its own history.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use super::{LedgerStore, MigrationRecord, SortOrder};
use crate::error::{MigrateError, Result};

/// Ledger stored in a SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
    table: String,
}

impl SqliteLedger {
    /// Creates a ledger using the given collection as table name.
    ///
    /// The name must be a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn new(pool: SqlitePool, collection: &str) -> Result<Self> {
        if !is_identifier(collection) {
            return Err(MigrateError::InvalidConfig(format!(
                "migration collection '{collection}' is not a valid table name"
            )));
        }
        Ok(Self {
            pool,
            table: collection.to_string(),
        })
    }

    /// Returns the ledger table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n    \
             name VARCHAR(100) PRIMARY KEY NOT NULL,\n    \
             store VARCHAR(100) NOT NULL,\n    \
             applied_at TEXT NOT NULL\n)",
            self.table
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_applied_at(name: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite datetime('now') format
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .map_err(|e| {
            MigrateError::Ledger(format!(
                "record '{name}' has unreadable applied_at '{raw}': {e}"
            ))
        })
}

#[async_trait]
impl LedgerStore for SqliteLedger {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(&self.create_table_sql())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query_since(&self, since: &str, order: SortOrder) -> Result<Vec<MigrationRecord>> {
        let sql = format!(
            "SELECT name, store, applied_at FROM \"{}\" WHERE name >= ? ORDER BY name {}",
            self.table,
            order.sql()
        );
        debug!(sql = %sql, since = %since, "Querying ledger");

        let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(name, store, applied_at)| {
                let applied_at = parse_applied_at(&name, &applied_at)?;
                Ok(MigrationRecord {
                    name,
                    store,
                    applied_at,
                })
            })
            .collect()
    }

    async fn insert(&self, record: &MigrationRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (name, store, applied_at) VALUES (?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.name)
            .bind(&record.store)
            .bind(record.applied_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<u64> {
        let sql = format!("DELETE FROM \"{}\" WHERE name = ?", self.table);
        let result = sqlx::query(&sql).bind(name).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
