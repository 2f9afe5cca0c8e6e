//! In-process ledger.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{LedgerStore, MigrationRecord, SortOrder};
use crate::error::{MigrateError, Result};

/// Ledger kept in memory, keyed by migration name.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<Mutex<BTreeMap<String, MigrationRecord>>>,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded names in ascending order.
    pub async fn names(&self) -> Vec<String> {
        self.records.lock().await.keys().cloned().collect()
    }

    /// Returns whether a record exists for `name`.
    pub async fn contains(&self, name: &str) -> bool {
        self.records.lock().await.contains_key(name)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn query_since(&self, since: &str, order: SortOrder) -> Result<Vec<MigrationRecord>> {
        let records = self.records.lock().await;
        let matching = records
            .range::<str, _>((Bound::Included(since), Bound::Unbounded))
            .map(|(_, record)| record.clone());
        Ok(match order {
            SortOrder::Ascending => matching.collect(),
            SortOrder::Descending => matching.rev().collect(),
        })
    }

    async fn insert(&self, record: &MigrationRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.name) {
            return Err(MigrateError::Ledger(format!(
                "record '{}' already exists",
                record.name
            )));
        }
        records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete_by_name(&self, name: &str) -> Result<u64> {
        Ok(u64::from(self.records.lock().await.remove(name).is_some()))
    }
}
