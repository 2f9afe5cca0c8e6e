//! Migration executor.
//!
//! This module runs outstanding migrations against a store, one at a time,
//! and keeps the ledger in step with every script that completes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::ScriptCatalog;
use crate::error::{MigrateError, Result};
use crate::ledger::{Direction, LedgerStore, MigrationRecord, SortOrder};
use crate::resolver::resolve;
use crate::script::{ScriptLoader, ScriptRegistry};

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Direction that was run.
    pub direction: Direction,
    /// Migrations that completed, in execution order.
    pub migrations: Vec<String>,
}

impl RunReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            migrations: Vec::new(),
        }
    }

    /// Returns whether there was nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// State of one migration as seen by the catalog and the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// When it was applied, if it is recorded.
    pub applied_at: Option<DateTime<Utc>>,
    /// Whether the catalog still lists the script.
    pub available: bool,
}

impl MigrationStatus {
    /// Returns whether the migration is recorded as applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Runs migrations against a store, strictly in sequence.
///
/// The store handle, ledger, catalog and loader are all injected; the
/// executor is the only component that writes to the ledger.
pub struct MigrationExecutor<S: Sync + 'static, L: LedgerStore> {
    store_name: String,
    store: S,
    ledger: L,
    catalog: Box<dyn ScriptCatalog>,
    loader: Box<dyn ScriptLoader<S>>,
}

impl<S: Sync + 'static, L: LedgerStore> MigrationExecutor<S, L> {
    /// Creates a new migration executor.
    pub fn new(
        store_name: impl Into<String>,
        store: S,
        ledger: L,
        catalog: impl ScriptCatalog + 'static,
        loader: impl ScriptLoader<S> + 'static,
    ) -> Self {
        Self {
            store_name: store_name.into(),
            store,
            ledger,
            catalog: Box::new(catalog),
            loader: Box::new(loader),
        }
    }

    /// Creates an executor whose scripts all come from `registry`.
    pub fn with_registry(
        store_name: impl Into<String>,
        store: S,
        ledger: L,
        registry: ScriptRegistry<S>,
    ) -> Self {
        Self::new(store_name, store, ledger, registry.clone(), registry)
    }

    /// Returns the logical store name recorded in the ledger.
    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    /// Returns the store handle passed to scripts.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Returns the migrations a run in `direction` would execute, in order.
    pub async fn pending(&self, direction: Direction, since: &str) -> Result<Vec<String>> {
        resolve(&self.ledger, self.catalog.as_ref(), direction, since).await
    }

    /// Applies every outstanding migration with `name >= since`.
    pub async fn up(&self, since: &str) -> Result<RunReport> {
        self.run(Direction::Up, since).await
    }

    /// Reverts every applied migration with `name >= since`, newest first.
    pub async fn down(&self, since: &str) -> Result<RunReport> {
        self.run(Direction::Down, since).await
    }

    /// Resolves and runs migrations in `direction`.
    ///
    /// Each step starts only after the previous step's ledger write has been
    /// acknowledged. The first failure is returned as is and nothing after it
    /// runs; records of earlier steps stay in place.
    pub async fn run(&self, direction: Direction, since: &str) -> Result<RunReport> {
        let names = self.pending(direction, since).await?;

        let mut report = RunReport::new(direction);
        if names.is_empty() {
            info!(store = %self.store_name, "No new migrations to run.");
            return Ok(report);
        }

        for name in names {
            self.step(direction, &name).await?;
            report.migrations.push(name);
        }

        info!(
            store = %self.store_name,
            direction = %direction,
            count = report.migrations.len(),
            "Migrations completed"
        );
        Ok(report)
    }

    async fn step(&self, direction: Direction, name: &str) -> Result<()> {
        info!(migration = %name, direction = %direction, "Running migration");

        let script = self.loader.load(name).await?;
        script
            .run(direction, &self.store)
            .await
            .map_err(|source| MigrateError::ScriptFailed {
                name: name.to_string(),
                direction,
                source,
            })?;

        self.record(direction, name)
            .await
            .map_err(|e| MigrateError::LedgerWrite {
                name: name.to_string(),
                source: Box::new(e),
            })?;

        info!(migration = %name, direction = %direction, "Migration finished successfully");
        Ok(())
    }

    async fn record(&self, direction: Direction, name: &str) -> Result<()> {
        match direction {
            Direction::Up => {
                self.ledger
                    .insert(&MigrationRecord::now(name, &self.store_name))
                    .await
            }
            Direction::Down => {
                let removed = self.ledger.delete_by_name(name).await?;
                if removed == 0 {
                    warn!(migration = %name, "No ledger record removed");
                }
                Ok(())
            }
        }
    }

    /// Lists every known migration, ascending, with its ledger state.
    ///
    /// Includes ledger entries whose script is no longer in the catalog.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        self.ledger
            .ensure_schema()
            .await
            .map_err(|e| MigrateError::LedgerAccess(Box::new(e)))?;
        let records = self
            .ledger
            .query_since("", SortOrder::Ascending)
            .await
            .map_err(|e| MigrateError::LedgerAccess(Box::new(e)))?;

        let mut all: BTreeMap<String, MigrationStatus> = BTreeMap::new();
        for name in self.catalog.list()? {
            all.insert(
                name.clone(),
                MigrationStatus {
                    name,
                    applied_at: None,
                    available: true,
                },
            );
        }
        for record in records {
            all.entry(record.name.clone())
                .or_insert_with(|| MigrationStatus {
                    name: record.name,
                    applied_at: None,
                    available: false,
                })
                .applied_at = Some(record.applied_at);
        }

        Ok(all.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::script::MigrationScript;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store handle that journals script calls and can see the ledger.
    #[derive(Default)]
    struct TestStore {
        journal: Mutex<Vec<String>>,
        ledger: MemoryLedger,
    }

    impl TestStore {
        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }
    }

    struct Step {
        fails: Option<Direction>,
    }

    const OK: Step = Step { fails: None };

    impl Step {
        async fn call(&self, direction: Direction, store: &TestStore) -> anyhow::Result<()> {
            let recorded = store.ledger.names().await.join(",");
            store
                .journal
                .lock()
                .unwrap()
                .push(format!("{direction} [{recorded}]"));
            if self.fails == Some(direction) {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MigrationScript<TestStore> for Step {
        async fn up(&self, store: &TestStore) -> anyhow::Result<()> {
            self.call(Direction::Up, store).await
        }

        async fn down(&self, store: &TestStore) -> anyhow::Result<()> {
            self.call(Direction::Down, store).await
        }
    }

    fn executor(registry: ScriptRegistry<TestStore>) -> MigrationExecutor<TestStore, MemoryLedger> {
        let store = TestStore::default();
        let ledger = store.ledger.clone();
        MigrationExecutor::with_registry("db", store, ledger, registry)
    }

    #[tokio::test]
    async fn test_up_then_down_scenario() {
        let registry = ScriptRegistry::new()
            .register("1-init.js", OK)
            .register("2-addcol.js", OK);
        let executor = executor(registry);

        assert_eq!(
            executor.pending(Direction::Up, "").await.unwrap(),
            ["1-init.js", "2-addcol.js"]
        );
        let report = executor.up("").await.unwrap();
        assert_eq!(report.direction, Direction::Up);
        assert_eq!(report.migrations, ["1-init.js", "2-addcol.js"]);
        assert_eq!(executor.ledger().names().await, ["1-init.js", "2-addcol.js"]);

        assert_eq!(
            executor.pending(Direction::Down, "").await.unwrap(),
            ["2-addcol.js", "1-init.js"]
        );
        let report = executor.down("").await.unwrap();
        assert_eq!(report.migrations, ["2-addcol.js", "1-init.js"]);
        assert!(executor.ledger().names().await.is_empty());
    }

    #[tokio::test]
    async fn test_each_step_sees_previous_record() {
        let registry = ScriptRegistry::new()
            .register("20230101-a", OK)
            .register("20230102-b", OK);
        let executor = executor(registry);

        executor.up("").await.unwrap();
        assert_eq!(
            executor.store().journal(),
            ["up []", "up [20230101-a]"]
        );

        executor.down("").await.unwrap();
        assert_eq!(
            executor.store().journal()[2..],
            ["down [20230101-a,20230102-b]", "down [20230101-a]"]
        );
    }

    #[tokio::test]
    async fn test_failure_halts_run() {
        let registry = ScriptRegistry::new()
            .register("1-a", OK)
            .register(
                "2-b",
                Step {
                    fails: Some(Direction::Up),
                },
            )
            .register("3-c", OK);
        let executor = executor(registry);

        let err = executor.up("").await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::ScriptFailed { ref name, direction: Direction::Up, .. } if name == "2-b"
        ));
        assert_eq!(err.migration(), Some("2-b"));
        assert_eq!(executor.ledger().names().await, ["1-a"]);
        // 3-c was never invoked.
        assert_eq!(executor.store().journal().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_revert_keeps_record() {
        let registry = ScriptRegistry::new()
            .register("1-a", OK)
            .register(
                "2-b",
                Step {
                    fails: Some(Direction::Down),
                },
            );
        let executor = executor(registry);
        executor.up("").await.unwrap();

        assert!(executor.down("").await.is_err());
        assert_eq!(executor.ledger().names().await, ["1-a", "2-b"]);
        assert_eq!(executor.store().journal().len(), 3);
    }

    #[tokio::test]
    async fn test_second_up_is_noop() {
        let registry = ScriptRegistry::new().register("1-a", OK);
        let executor = executor(registry);

        executor.up("").await.unwrap();
        let before = executor.ledger().query_since("", SortOrder::Ascending).await.unwrap();

        let report = executor.up("").await.unwrap();
        assert!(report.is_empty());
        let after = executor.ledger().query_since("", SortOrder::Ascending).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(executor.store().journal().len(), 1);
    }

    #[tokio::test]
    async fn test_records_carry_store_name() {
        let registry = ScriptRegistry::new().register("1-a", OK);
        let store = TestStore::default();
        let ledger = store.ledger.clone();
        let executor = MigrationExecutor::with_registry("reporting", store, ledger, registry);

        executor.up("").await.unwrap();
        let records = executor.ledger().query_since("", SortOrder::Ascending).await.unwrap();
        assert_eq!(records[0].store, "reporting");
    }

    #[tokio::test]
    async fn test_since_limits_revert() {
        let registry = ScriptRegistry::new()
            .register("20230101-a", OK)
            .register("20230102-b", OK)
            .register("20230103-c", OK);
        let executor = executor(registry);
        executor.up("").await.unwrap();

        let report = executor.down("20230102").await.unwrap();
        assert_eq!(report.migrations, ["20230103-c", "20230102-b"]);
        assert_eq!(executor.ledger().names().await, ["20230101-a"]);
    }

    struct Listed(Vec<&'static str>);

    impl ScriptCatalog for Listed {
        fn list(&self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(ToString::to_string).collect())
        }
    }

    #[tokio::test]
    async fn test_unloadable_script_halts_run() {
        let registry = ScriptRegistry::new().register("1-a", OK).register("3-c", OK);
        let store = TestStore::default();
        let ledger = store.ledger.clone();
        let executor = MigrationExecutor::new(
            "db",
            store,
            ledger,
            Listed(vec!["1-a", "2-b", "3-c"]),
            registry,
        );

        let err = executor.up("").await.unwrap_err();
        assert!(matches!(err, MigrateError::ScriptLoad { ref name, .. } if name == "2-b"));
        assert_eq!(executor.ledger().names().await, ["1-a"]);
    }

    /// Ledger whose inserts fail for one name.
    struct FailingInsert {
        inner: MemoryLedger,
        name: &'static str,
    }

    #[async_trait]
    impl LedgerStore for FailingInsert {
        async fn ensure_schema(&self) -> Result<()> {
            self.inner.ensure_schema().await
        }

        async fn query_since(&self, since: &str, order: SortOrder) -> Result<Vec<MigrationRecord>> {
            self.inner.query_since(since, order).await
        }

        async fn insert(&self, record: &MigrationRecord) -> Result<()> {
            if record.name == self.name {
                return Err(MigrateError::Ledger("disk full".to_string()));
            }
            self.inner.insert(record).await
        }

        async fn delete_by_name(&self, name: &str) -> Result<u64> {
            self.inner.delete_by_name(name).await
        }
    }

    #[tokio::test]
    async fn test_ledger_write_failure_halts_run() {
        let registry = ScriptRegistry::new()
            .register("1-a", OK)
            .register("2-b", OK)
            .register("3-c", OK);
        let store = TestStore::default();
        let ledger = FailingInsert {
            inner: store.ledger.clone(),
            name: "2-b",
        };
        let executor = MigrationExecutor::with_registry("db", store, ledger, registry);

        let err = executor.up("").await.unwrap_err();
        assert!(matches!(err, MigrateError::LedgerWrite { ref name, .. } if name == "2-b"));
        // 2-b ran but is unrecorded; 3-c never ran.
        assert_eq!(executor.store().journal().len(), 2);
        assert_eq!(executor.store().ledger.names().await, ["1-a"]);
    }

    #[tokio::test]
    async fn test_status_merges_catalog_and_ledger() {
        let registry = ScriptRegistry::new().register("1-a", OK).register("2-b", OK);
        let executor = executor(registry);
        executor.up("").await.unwrap();
        executor
            .ledger()
            .insert(&MigrationRecord::now("0-gone", "db"))
            .await
            .unwrap();

        let status = executor.status().await.unwrap();
        let summary: Vec<(&str, bool, bool)> = status
            .iter()
            .map(|s| (s.name.as_str(), s.is_applied(), s.available))
            .collect();
        assert_eq!(
            summary,
            [("0-gone", true, false), ("1-a", true, true), ("2-b", true, true)]
        );
    }
}
