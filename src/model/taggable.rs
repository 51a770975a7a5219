//! Host record types that carry tags.

use crate::error::{Error, Result};
use crate::inflect::is_identifier;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// A persisted record type that declares tag contexts.
///
/// `name` is the stable type tag written into shared taggings;
/// `table` and `primary_key` locate its rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaggableType {
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl TaggableType {
    /// Create a type description with the conventional `id` primary key.
    #[must_use]
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            primary_key: default_primary_key(),
        }
    }

    #[must_use]
    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }

    /// Check the type name and identifiers.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the table or key is not a plain identifier.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("taggable type name is empty".to_string()));
        }
        for (what, ident) in [("table", &self.table), ("primary key", &self.primary_key)] {
            if !is_identifier(ident) {
                return Err(Error::Configuration(format!(
                    "{} {what} must be a plain identifier, got '{ident}'",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// A host record that can own taggings.
///
/// The record persists itself; nofly only needs its id, and asks it to
/// insert itself when a tag list is saved before the record is.
pub trait Taggable: 'static {
    /// Registry name of the record type (matches `TaggableType::name`).
    const TYPE_NAME: &'static str;

    /// Primary key, or `None` while unsaved.
    fn id(&self) -> Option<i64>;

    /// Insert the record's row and return its new id.
    ///
    /// Called inside the tag-save transaction.
    ///
    /// # Errors
    ///
    /// Any error aborts the surrounding save.
    fn insert(&self, conn: &Connection) -> Result<i64>;

    /// Remember the id assigned by [`Taggable::insert`].
    ///
    /// Only called once the surrounding transaction has committed.
    fn set_id(&mut self, id: i64);
}
