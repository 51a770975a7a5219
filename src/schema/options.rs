//! Context declaration options.

use crate::error::{Error, Result};
use crate::model::Taggable;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type PerRecordFn = dyn Fn(&dyn Any) -> Option<usize> + Send + Sync;

/// Maximum number of tags per record in one context.
#[derive(Clone)]
pub enum Limit {
    /// Same limit for every record.
    Fixed(usize),
    /// Limit derived from the owning record.
    ///
    /// The function must be pure: it runs at mutation time and again at
    /// validation time.
    PerRecord(Arc<PerRecordFn>),
}

impl Limit {
    /// Build a per-record limit for records of type `T`.
    pub fn per_record<T, F>(f: F) -> Self
    where
        T: Taggable,
        F: Fn(&T) -> usize + Send + Sync + 'static,
    {
        Self::PerRecord(Arc::new(move |record: &dyn Any| {
            record.downcast_ref::<T>().map(&f)
        }))
    }

    /// Evaluate the limit for `record`.
    ///
    /// Returns `None` when a per-record function does not accept the
    /// record's type.
    #[must_use]
    pub fn resolve(&self, record: &dyn Any) -> Option<usize> {
        match self {
            Self::Fixed(n) => Some(*n),
            Self::PerRecord(f) => f(record),
        }
    }

    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Fixed(a), Self::Fixed(b)) => a == b,
            (Self::PerRecord(a), Self::PerRecord(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "Fixed({n})"),
            Self::PerRecord(_) => f.write_str("PerRecord(..)"),
        }
    }
}

/// Options for one `declare` call.
///
/// Defaults: default transformer, local scope, no restriction, no limit,
/// case-sensitive matching, no counter cache, derived table names.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub transformer: Option<String>,
    pub shared: bool,
    pub restrict_to_existing: bool,
    pub limit: Option<Limit>,
    pub case_sensitive: bool,
    pub counter_cache: bool,
    pub tag_table: Option<String>,
    pub tagging_table: Option<String>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            transformer: None,
            shared: false,
            restrict_to_existing: false,
            limit: None,
            case_sensitive: true,
            counter_cache: false,
            tag_table: None,
            tagging_table: None,
        }
    }
}

impl ContextOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn transformer(mut self, id: &str) -> Self {
        self.transformer = Some(id.to_string());
        self
    }

    /// Store tags in the global tables shared by every opted-in type.
    #[must_use]
    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    #[must_use]
    pub fn restrict_to_existing(mut self) -> Self {
        self.restrict_to_existing = true;
        self
    }

    #[must_use]
    pub fn limit(mut self, max: usize) -> Self {
        self.limit = Some(Limit::Fixed(max));
        self
    }

    #[must_use]
    pub fn limit_with(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    #[must_use]
    pub fn counter_cache(mut self) -> Self {
        self.counter_cache = true;
        self
    }

    #[must_use]
    pub fn tag_table(mut self, table: &str) -> Self {
        self.tag_table = Some(table.to_string());
        self
    }

    #[must_use]
    pub fn tagging_table(mut self, table: &str) -> Self {
        self.tagging_table = Some(table.to_string());
        self
    }

    /// Parse options from a JSON object.
    ///
    /// Recognized keys: `transformer`, `shared` (aliases `polymorphic`,
    /// `global`), `restrict_to_existing`, `limit`, `case_sensitive`,
    /// `counter_cache`, `tag_table`, `tagging_table`, and the class-name
    /// forms `tag_class_name` / `tagging_class_name` which are tableized.
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a recognized key has the wrong type.
    pub fn from_json(value: &Value) -> Result<Self> {
        let mut options = Self::default();
        let Some(map) = value.as_object() else {
            if value.is_null() {
                return Ok(options);
            }
            return Err(Error::Configuration(format!(
                "context options must be an object, got {value}"
            )));
        };

        for (key, value) in map {
            match key.as_str() {
                "transformer" => options.transformer = Some(expect_str(key, value)?.to_string()),
                "shared" | "polymorphic" | "global" => options.shared = expect_bool(key, value)?,
                "restrict_to_existing" => options.restrict_to_existing = expect_bool(key, value)?,
                "case_sensitive" => options.case_sensitive = expect_bool(key, value)?,
                "counter_cache" => options.counter_cache = expect_bool(key, value)?,
                "limit" => {
                    options.limit = match value {
                        Value::Null => None,
                        _ => Some(Limit::Fixed(expect_usize(key, value)?)),
                    };
                }
                "tag_table" => options.tag_table = Some(expect_str(key, value)?.to_string()),
                "tagging_table" => {
                    options.tagging_table = Some(expect_str(key, value)?.to_string());
                }
                "tag_class_name" => {
                    options.tag_table = Some(crate::inflect::tableize(expect_str(key, value)?));
                }
                "tagging_class_name" => {
                    options.tagging_table =
                        Some(crate::inflect::tableize(expect_str(key, value)?));
                }
                other => debug!(option = other, "Ignoring unknown context option"),
            }
        }

        Ok(options)
    }
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::Configuration(format!("option '{key}' must be a boolean")))
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::Configuration(format!("option '{key}' must be a string")))
}

fn expect_usize(key: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            Error::Configuration(format!("option '{key}' must be a non-negative integer"))
        })
}

/// Structural equality used to detect conflicting re-declarations.
pub(crate) fn limits_match(a: Option<&Limit>, b: Option<&Limit>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}
