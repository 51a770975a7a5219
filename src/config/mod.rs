//! Configuration management.
//!
//! This module loads the process-wide tagging configuration:
//! - **Shared tables**: names of the global tag/tagging table pair used by
//!   every context declared with `shared = true`
//! - **Connection**: SQLite busy timeout
//! - **Dialect**: default SQL dialect for rendered queries
//!
//! Configuration is read from an optional JSON file and then overridden by
//! environment variables, mirroring how declarations are loaded.

pub mod declarations;

pub use declarations::{Declarations, TypeDeclaration};

use crate::error::{Error, Result};
use crate::inflect::is_identifier;
use crate::query::Dialect;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default global tag table.
pub const DEFAULT_TAG_TABLE: &str = "application_tags";

/// Default global tagging table.
pub const DEFAULT_TAGGING_TABLE: &str = "application_taggings";

/// Default busy timeout for SQLite connections.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Process-wide tagging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    /// Global tag table for shared contexts.
    pub tag_table: String,
    /// Global tagging table for shared contexts.
    pub tagging_table: String,
    /// SQLite busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Default dialect for `Query::to_sql`.
    pub dialect: Dialect,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            tag_table: DEFAULT_TAG_TABLE.to_string(),
            tagging_table: DEFAULT_TAGGING_TABLE.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            dialect: Dialect::Sqlite,
        }
    }
}

impl TaggingConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a table
    /// name is not a plain identifier.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("Failed to read config file: {e}")))?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// Priority: env var > file > default.
    /// - `NOFLY_TAG_TABLE`
    /// - `NOFLY_TAGGING_TABLE`
    /// - `NOFLY_BUSY_TIMEOUT_MS`
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    ///
    /// # Errors
    ///
    /// Returns an error if an override is malformed.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(table) = non_empty("NOFLY_TAG_TABLE") {
            self.tag_table = table.trim().to_string();
        }
        if let Some(table) = non_empty("NOFLY_TAGGING_TABLE") {
            self.tagging_table = table.trim().to_string();
        }
        if let Some(timeout) = non_empty("NOFLY_BUSY_TIMEOUT_MS") {
            self.busy_timeout_ms = timeout.trim().parse().map_err(|_| {
                Error::Configuration(format!("NOFLY_BUSY_TIMEOUT_MS is not a number: {timeout}"))
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check that table names are usable SQL identifiers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending value.
    pub fn validate(&self) -> Result<()> {
        let tables = [("tag_table", &self.tag_table), ("tagging_table", &self.tagging_table)];
        for (key, value) in tables {
            if !is_identifier(value) {
                return Err(Error::Configuration(format!(
                    "{key} must be a plain identifier, got '{value}'"
                )));
            }
        }
        if self.tag_table == self.tagging_table {
            return Err(Error::Configuration(
                "tag_table and tagging_table must differ".to_string(),
            ));
        }
        Ok(())
    }
}
