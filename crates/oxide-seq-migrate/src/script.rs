//! Migration script contract and the registry for compiled scripts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::ScriptCatalog;
use crate::error::{MigrateError, Result};
use crate::ledger::Direction;

/// A migration with a forward and a backward step.
///
/// Both steps receive the store handle the executor was built with. Returning
/// an error halts the whole run.
#[async_trait]
pub trait MigrationScript<S: Sync + 'static>: Send + Sync {
    /// Applies the migration.
    async fn up(&self, store: &S) -> anyhow::Result<()>;

    /// Reverts the migration.
    async fn down(&self, store: &S) -> anyhow::Result<()>;

    /// Runs the step matching `direction`.
    async fn run(&self, direction: Direction, store: &S) -> anyhow::Result<()> {
        match direction {
            Direction::Up => self.up(store).await,
            Direction::Down => self.down(store).await,
        }
    }
}

/// Resolves a migration name to a runnable script.
#[async_trait]
pub trait ScriptLoader<S: Sync + 'static>: Send + Sync {
    /// Loads the script named `name`.
    ///
    /// Fails with [`MigrateError::ScriptLoad`] when the script is missing or
    /// malformed.
    async fn load(&self, name: &str) -> Result<Arc<dyn MigrationScript<S>>>;
}

/// Explicitly registered scripts, keyed by migration name.
///
/// Acts as both catalog and loader, for targets where scripts are compiled
/// into the binary.
pub struct ScriptRegistry<S: Sync + 'static> {
    scripts: BTreeMap<String, Arc<dyn MigrationScript<S>>>,
}

impl<S: Sync + 'static> ScriptRegistry<S> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: BTreeMap::new(),
        }
    }

    /// Registers a script under `name`.
    #[must_use]
    pub fn register(
        mut self,
        name: impl Into<String>,
        script: impl MigrationScript<S> + 'static,
    ) -> Self {
        self.insert(name, script);
        self
    }

    /// Registers a script under `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, script: impl MigrationScript<S> + 'static) {
        self.scripts.insert(name.into(), Arc::new(script));
    }

    /// Number of registered scripts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Returns whether no script is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}

impl<S: Sync + 'static> Default for ScriptRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Sync + 'static> Clone for ScriptRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            scripts: self.scripts.clone(),
        }
    }
}

impl<S: Sync + 'static> fmt::Debug for ScriptRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRegistry")
            .field("scripts", &self.scripts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Sync + 'static> ScriptCatalog for ScriptRegistry<S> {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.scripts.keys().cloned().collect())
    }
}

#[async_trait]
impl<S: Sync + 'static> ScriptLoader<S> for ScriptRegistry<S> {
    async fn load(&self, name: &str) -> Result<Arc<dyn MigrationScript<S>>> {
        self.scripts
            .get(name)
            .cloned()
            .ok_or_else(|| MigrateError::ScriptLoad {
                name: name.to_string(),
                message: "no script registered under this name".to_string(),
            })
    }
}
