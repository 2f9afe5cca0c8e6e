//! Discovery of migration scripts.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Default file suffix of migration scripts.
pub const DEFAULT_SUFFIX: &str = ".sql";

/// Lists the migration names available to a run.
///
/// Names must sort chronologically as plain strings, which the timestamp
/// prefix given by the writer guarantees.
pub trait ScriptCatalog: Send + Sync {
    /// Returns the available migration names in a stable order.
    fn list(&self) -> Result<Vec<String>>;
}

/// Catalog backed by the files of one directory.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    dir: PathBuf,
    suffix: String,
}

impl DirectoryCatalog {
    /// Creates a catalog over `dir`, matching files ending in `.sql`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Sets the recognized script suffix.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Returns the scanned directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory (and parents) if it does not exist.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

impl ScriptCatalog for DirectoryCatalog {
    fn list(&self) -> Result<Vec<String>> {
        self.ensure_dir()?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            // Follows symlinks; directories are skipped.
            if !fs::metadata(entry.path())?.is_file() {
                continue;
            }
            // Non UTF-8 names cannot be ledger keys.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.len() > self.suffix.len() && name.ends_with(&self.suffix) {
                names.push(name);
            }
        }
        names.sort();

        debug!(dir = %self.dir.display(), count = names.len(), "Listed migration scripts");
        Ok(names)
    }
}
