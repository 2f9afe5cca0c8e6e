//! Migration scripts written as SQL files.
//!
//! A script file holds an up section and an optional down section:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
//!
//! -- migrate:down
//! DROP TABLE users;
//! ```
//!
//! Each section runs as a single batch inside its own transaction.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Executor;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::script::{MigrationScript, ScriptLoader};

/// Marker opening the up section.
pub const UP_MARKER: &str = "-- migrate:up";
/// Marker opening the down section.
pub const DOWN_MARKER: &str = "-- migrate:down";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// A parsed SQL migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlScript {
    name: String,
    up: String,
    down: Option<String>,
}

impl SqlScript {
    /// Parses the text of a script file.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let malformed = |message: &str| MigrateError::ScriptLoad {
            name: name.to_string(),
            message: message.to_string(),
        };

        let mut section = Section::Preamble;
        let mut up: Option<String> = None;
        let mut down: Option<String> = None;

        for line in text.lines() {
            let marker = line.trim().to_ascii_lowercase();
            if marker == UP_MARKER {
                if up.is_some() {
                    return Err(malformed("duplicate `-- migrate:up` marker"));
                }
                up = Some(String::new());
                section = Section::Up;
                continue;
            }
            if marker == DOWN_MARKER {
                if down.is_some() {
                    return Err(malformed("duplicate `-- migrate:down` marker"));
                }
                down = Some(String::new());
                section = Section::Down;
                continue;
            }

            let target = match section {
                Section::Preamble => continue,
                Section::Up => up.as_mut(),
                Section::Down => down.as_mut(),
            };
            if let Some(buf) = target {
                buf.push_str(line);
                buf.push('\n');
            }
        }

        let up = up.ok_or_else(|| malformed("missing `-- migrate:up` section"))?;
        Ok(Self {
            name: name.to_string(),
            up: up.trim().to_string(),
            down: down.map(|d| d.trim().to_string()),
        })
    }

    /// Returns the migration name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SQL of the up section.
    #[must_use]
    pub fn up_sql(&self) -> &str {
        &self.up
    }

    /// SQL of the down section, if the script has one.
    #[must_use]
    pub fn down_sql(&self) -> Option<&str> {
        self.down.as_deref()
    }

    /// Returns whether the script can be reverted.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    async fn execute(&self, pool: &SqlitePool, sql: &str) -> anyhow::Result<()> {
        if sql.is_empty() {
            return Ok(());
        }
        debug!(migration = %self.name, sql = %sql, "Executing SQL");

        let mut tx = pool.begin().await?;
        {
            let conn: &mut SqliteConnection = &mut tx;
            let mut results = conn.execute_many(sqlx::raw_sql(sql));
            while let Some(result) = results.try_next().await? {
                debug!(migration = %self.name, rows = result.rows_affected(), "Statement done");
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationScript<SqlitePool> for SqlScript {
    async fn up(&self, store: &SqlitePool) -> anyhow::Result<()> {
        self.execute(store, &self.up).await
    }

    async fn down(&self, store: &SqlitePool) -> anyhow::Result<()> {
        match &self.down {
            Some(sql) => self.execute(store, sql).await,
            None => anyhow::bail!("migration '{}' is not reversible", self.name),
        }
    }
}

/// Loads [`SqlScript`]s from a directory.
#[derive(Debug, Clone)]
pub struct SqlFileLoader {
    dir: PathBuf,
}

impl SqlFileLoader {
    /// Creates a loader reading scripts from `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ScriptLoader<SqlitePool> for SqlFileLoader {
    async fn load(&self, name: &str) -> Result<Arc<dyn MigrationScript<SqlitePool>>> {
        let path = self.dir.join(name);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrateError::ScriptLoad {
                name: name.to_string(),
                message: format!("cannot read {}: {e}", path.display()),
            })?;
        Ok(Arc::new(SqlScript::parse(name, &text)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn table_exists(pool: &SqlitePool, table: &str) -> bool {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(table)
                .fetch_optional(pool)
                .await
                .unwrap();
        row.is_some()
    }

    const USERS: &str = "\
-- Create the users table.
-- migrate:up
CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
CREATE INDEX users_name ON users (name);

-- migrate:down
DROP TABLE users;
";

    #[test]
    fn test_parse_sections() {
        let script = SqlScript::parse("1-init.sql", USERS).unwrap();
        assert_eq!(
            script.up_sql(),
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n\
             CREATE INDEX users_name ON users (name);"
        );
        assert_eq!(script.down_sql(), Some("DROP TABLE users;"));
        assert!(script.is_reversible());
    }

    #[test]
    fn test_parse_markers_case_insensitive() {
        let script = SqlScript::parse("x.sql", "  -- MIGRATE:UP  \nSELECT 1;\n").unwrap();
        assert_eq!(script.up_sql(), "SELECT 1;");
        assert!(!script.is_reversible());
    }

    #[test]
    fn test_parse_missing_up() {
        let err = SqlScript::parse("x.sql", "CREATE TABLE t (id INTEGER);").unwrap_err();
        assert!(matches!(err, MigrateError::ScriptLoad { .. }));
    }

    #[test]
    fn test_parse_duplicate_marker() {
        let text = "-- migrate:up\nSELECT 1;\n-- migrate:up\nSELECT 2;\n";
        assert!(SqlScript::parse("x.sql", text).is_err());
    }

    #[tokio::test]
    async fn test_up_and_down() {
        let pool = create_test_pool().await;
        let script = SqlScript::parse("1-init.sql", USERS).unwrap();

        script.up(&pool).await.unwrap();
        assert!(table_exists(&pool, "users").await);

        script.down(&pool).await.unwrap();
        assert!(!table_exists(&pool, "users").await);
    }

    #[tokio::test]
    async fn test_batch_runs_every_statement() {
        let pool = create_test_pool().await;
        let text = "\
-- migrate:up
CREATE TABLE tags (name TEXT NOT NULL);
INSERT INTO tags (name) VALUES ('a');
INSERT INTO tags (name) VALUES ('b'), ('c');
";
        let script = SqlScript::parse("1-tags.sql", text).unwrap();
        script.up(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_failed_section_rolls_back() {
        let pool = create_test_pool().await;
        let text = "-- migrate:up\nCREATE TABLE a (id INTEGER);\nNOT VALID SQL;\n";
        let script = SqlScript::parse("bad.sql", text).unwrap();

        assert!(script.up(&pool).await.is_err());
        assert!(!table_exists(&pool, "a").await);
    }

    #[tokio::test]
    async fn test_down_without_section_fails() {
        let pool = create_test_pool().await;
        let script = SqlScript::parse("x.sql", "-- migrate:up\nSELECT 1;\n").unwrap();
        let err = script.down(&pool).await.unwrap_err();
        assert!(err.to_string().contains("not reversible"));
    }

    #[tokio::test]
    async fn test_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1-init.sql"), USERS).unwrap();
        let loader = SqlFileLoader::new(dir.path());

        assert!(loader.load("1-init.sql").await.is_ok());
        assert!(matches!(
            loader.load("2-missing.sql").await.err().unwrap(),
            MigrateError::ScriptLoad { .. }
        ));
    }
}
