//! Example: Blog Application Migrations
//!
//! Migrations compiled into the binary and registered by name, run against an
//! in-memory SQLite database.
//!
//! Run with: cargo run --example blog_migrations -p oxide-seq-migrate

use async_trait::async_trait;
use oxide_seq_migrate::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

// =============================================================================
// Migration Definitions
// =============================================================================

/// Runs one SQL statement per direction.
struct Statement {
    up: &'static str,
    down: &'static str,
}

#[async_trait]
impl MigrationScript<SqlitePool> for Statement {
    async fn up(&self, pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(self.up).execute(pool).await?;
        Ok(())
    }

    async fn down(&self, pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(self.down).execute(pool).await?;
        Ok(())
    }
}

fn registry() -> ScriptRegistry<SqlitePool> {
    ScriptRegistry::new()
        .register(
            "20240101090000-create_users",
            Statement {
                up: "CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT NOT NULL UNIQUE)",
                down: "DROP TABLE users",
            },
        )
        .register(
            "20240102090000-create_posts",
            Statement {
                up: "CREATE TABLE posts (id INTEGER PRIMARY KEY, author_id INTEGER NOT NULL \
                     REFERENCES users (id), title TEXT NOT NULL)",
                down: "DROP TABLE posts",
            },
        )
        .register(
            "20240103090000-index_posts_author",
            Statement {
                up: "CREATE INDEX idx_posts_author ON posts (author_id)",
                down: "DROP INDEX idx_posts_author",
            },
        )
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;

    let ledger = SqliteLedger::new(pool.clone(), DEFAULT_COLLECTION)?;
    let executor = MigrationExecutor::with_registry("blog", pool, ledger, registry());

    println!("[1] Pending migrations:");
    for name in executor.pending(Direction::Up, "").await? {
        println!("    {name}");
    }

    println!("\n[2] Applying...");
    let report = executor.up("").await?;
    println!("    applied {}", report.migrations.len());

    println!("\n[3] Reverting everything since 20240102...");
    let report = executor.down("20240102").await?;
    for name in &report.migrations {
        println!("    reverted {name}");
    }

    println!("\n[4] Final state:");
    for status in executor.status().await? {
        let mark = if status.is_applied() { "X" } else { " " };
        println!("    [{mark}] {}", status.name);
    }

    Ok(())
}
