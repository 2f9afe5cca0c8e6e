//! Computes which migrations a run has to execute.

use std::collections::HashSet;

use tracing::debug;

use crate::catalog::ScriptCatalog;
use crate::error::{MigrateError, Result};
use crate::ledger::{Direction, LedgerStore};

/// Returns the ordered names a run in `direction` must execute.
///
/// - `Up`: catalog names without a ledger record, ascending.
/// - `Down`: ledger names, descending. The catalog is not consulted.
///
/// Both exclude names lower than `since`; an empty `since` is no bound.
/// The ledger schema is created first; any ledger failure is reported as
/// [`MigrateError::LedgerAccess`] before a single script is touched.
pub async fn resolve<L>(
    ledger: &L,
    catalog: &dyn ScriptCatalog,
    direction: Direction,
    since: &str,
) -> Result<Vec<String>>
where
    L: LedgerStore + ?Sized,
{
    ledger
        .ensure_schema()
        .await
        .map_err(|e| MigrateError::LedgerAccess(Box::new(e)))?;

    let records = ledger
        .query_since(since, direction.order())
        .await
        .map_err(|e| MigrateError::LedgerAccess(Box::new(e)))?;

    let names = match direction {
        Direction::Up => {
            let applied: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();
            let mut outstanding: Vec<String> = catalog
                .list()?
                .into_iter()
                .filter(|name| name.as_str() >= since && !applied.contains(name.as_str()))
                .collect();
            outstanding.sort();
            outstanding.dedup();
            outstanding
        }
        Direction::Down => records.into_iter().map(|r| r.name).collect(),
    };

    debug!(
        direction = %direction,
        since = %since,
        count = names.len(),
        "Resolved outstanding migrations"
    );
    Ok(names)
}
