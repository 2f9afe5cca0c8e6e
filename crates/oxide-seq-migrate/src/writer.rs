//! Creation of new migration files.
//!
//! New files are named `<YYYYMMDDHHMMSS>-<name>.sql` so that plain string
//! ordering follows creation order.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use regex::Regex;
use tracing::info;

use crate::catalog::DEFAULT_SUFFIX;
use crate::error::{MigrateError, Result};

/// Contents written into every new migration file.
pub const SKELETON: &str = "\
-- Describe the change made by this migration.

-- migrate:up


-- migrate:down

";

/// Reduces a free-form name to `[a-z0-9_]`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let disallowed = Regex::new(r"[^a-z0-9_]+").expect("Invalid slug pattern regex");
    let lowered = name.trim().to_lowercase();
    disallowed
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Generates a migration file name from a timestamp and an optional name.
///
/// A name that looks like a command-line flag, or that sanitizes to nothing,
/// yields the bare timestamp.
#[must_use]
pub fn generate_migration_name<Tz: TimeZone>(
    timestamp: &DateTime<Tz>,
    name: Option<&str>,
    suffix: &str,
) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = timestamp.format("%Y%m%d%H%M%S").to_string();
    let slug = name
        .filter(|n| !n.starts_with("--"))
        .map(sanitize_name)
        .unwrap_or_default();

    if slug.is_empty() {
        format!("{stamp}{suffix}")
    } else {
        format!("{stamp}-{slug}{suffix}")
    }
}

/// Writes new migration files into a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    dir: PathBuf,
    suffix: String,
}

impl MigrationWriter {
    /// Creates a writer for `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Sets the suffix of generated files.
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Returns the target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates a migration file stamped with the current local time.
    pub fn create(&self, name: Option<&str>) -> Result<PathBuf> {
        self.create_at(&Local::now(), name)
    }

    /// Creates a migration file stamped with `timestamp`.
    ///
    /// Never overwrites: an existing file yields
    /// [`MigrateError::MigrationExists`].
    pub fn create_at<Tz: TimeZone>(
        &self,
        timestamp: &DateTime<Tz>,
        name: Option<&str>,
    ) -> Result<PathBuf>
    where
        Tz::Offset: std::fmt::Display,
    {
        std::fs::create_dir_all(&self.dir)?;

        let file_name = generate_migration_name(timestamp, name, &self.suffix);
        let path = self.dir.join(file_name);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(MigrateError::MigrationExists(path));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(SKELETON.as_bytes())?;

        info!(path = %path.display(), "Created migration");
        Ok(path)
    }
}
