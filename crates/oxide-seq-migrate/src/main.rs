//! oxide-seq-migrate CLI
//!
//! Command-line tool for applying, reverting and creating migrations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dialoguer::Input;
use sqlx::sqlite::SqlitePool;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use oxide_seq_migrate::prelude::*;
use oxide_seq_migrate::sql_executor;

/// Sequential, ledger-tracked migrations.
#[derive(Parser)]
#[command(name = "oxide-seq-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Datasource (logical store) to migrate.
    #[arg(long, global = true, default_value = "db")]
    datasource: String,

    /// Root directory of migration scripts; scripts live in <directory>/<datasource>.
    #[arg(long, global = true, default_value = "server/migrations")]
    directory: PathBuf,

    /// Only consider migrations whose name sorts at or after this value.
    #[arg(long, global = true, default_value = "")]
    since: String,

    /// Datasource definitions (TOML). Without it, --database is bound to --datasource.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL used when no datasource file is given.
    #[arg(short, long, global = true, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Name of the ledger table.
    #[arg(long, global = true, default_value = "Migration")]
    migration_collection: String,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all outstanding migrations, oldest first.
    Up,

    /// Revert all applied migrations, newest first.
    Down,

    /// Create a new, empty migration file.
    Create {
        /// Migration name (prompted for when omitted).
        name: Option<String>,
    },

    /// Show which migrations are applied.
    Status {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn options(&self) -> MigrateOptions {
        MigrateOptions {
            store: self.datasource.clone(),
            migrations_root: self.directory.clone(),
            since: self.since.clone(),
            collection: self.migration_collection.clone(),
            ..MigrateOptions::default()
        }
    }

    fn datasources(&self) -> Result<DataSources> {
        match &self.config {
            Some(path) => DataSources::from_file(path),
            None => Ok(DataSources::single(&self.datasource, &self.database)),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = cli.options();

    match &cli.command {
        Commands::Create { name } => {
            create(&options, name.clone())?;
        }

        Commands::Up => {
            let report = connect(&cli, &options).await?.up(&options.since).await?;
            if !report.is_empty() {
                info!("Applied {} migration(s).", report.migrations.len());
            }
        }

        Commands::Down => {
            let report = connect(&cli, &options).await?.down(&options.since).await?;
            if !report.is_empty() {
                info!("Reverted {} migration(s).", report.migrations.len());
            }
        }

        Commands::Status { json } => {
            let status = connect(&cli, &options).await?.status().await?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else if status.is_empty() {
                info!("No migrations found for '{}'.", options.store);
            } else {
                println!("\nMigrations for '{}':", options.store);
                println!("{:-<60}", "");

                for migration in &status {
                    let mark = if migration.is_applied() { "X" } else { " " };
                    let applied_at = migration
                        .applied_at
                        .map(|at| at.format(" (%Y-%m-%d %H:%M:%S)").to_string())
                        .unwrap_or_default();
                    let missing = if migration.available { "" } else { " [missing script]" };
                    println!(" [{mark}] {}{applied_at}{missing}", migration.name);
                }
                println!();
            }
        }
    }

    Ok(())
}

/// Connects to the configured datasource; an unknown name fails here, before
/// any migration work.
async fn connect(
    cli: &Cli,
    options: &MigrateOptions,
) -> anyhow::Result<MigrationExecutor<SqlitePool, SqliteLedger>> {
    let pool = cli.datasources()?.connect(&options.store).await?;
    Ok(sql_executor(options, pool)?)
}

fn create(options: &MigrateOptions, name: Option<String>) -> anyhow::Result<()> {
    let name = match name {
        Some(name) => name,
        None => Input::<String>::new()
            .with_prompt("Enter migration script name")
            .allow_empty(true)
            .interact_text()?,
    };
    let name = Some(name.as_str()).filter(|n| !n.trim().is_empty());

    MigrationWriter::new(options.store_dir())
        .with_suffix(options.suffix.clone())
        .create(name)?;
    Ok(())
}
