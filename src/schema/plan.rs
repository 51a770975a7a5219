//! The schema planner.
//!
//! `plan` is a pure function of (taggable type, context name, options,
//! global config): identical inputs always produce identical identities.

use super::options::{limits_match, ContextOptions, Limit};
use crate::config::TaggingConfig;
use crate::error::{Error, Result};
use crate::inflect::{is_identifier, singularize};
use crate::model::{Owner, TaggableType};
use crate::transform::{TagTransformer, TransformerRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Owner id column in every tagging table.
pub const OWNER_ID_COLUMN: &str = "taggable_id";

/// Owner type column in shared tagging tables.
pub const OWNER_TYPE_COLUMN: &str = "taggable_type";

/// Where a context's tags live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Tables dedicated to one taggable type.
    Local,
    /// The global table pair shared by all opted-in types.
    Shared,
}

impl Scope {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Shared => "shared",
        }
    }
}

/// Resolved identities and policy for one (taggable type, context).
#[derive(Debug, Clone)]
pub struct ContextPlan {
    pub taggable: TaggableType,
    /// Context name as declared (e.g. `colors`)
    pub context: String,
    /// Singular label stored in the `context` column (e.g. `color`)
    pub label: String,
    pub scope: Scope,
    pub tag_table: String,
    pub tagging_table: String,
    /// `{context}_count` on the taggable table when counter-cached
    pub counter_cache_column: Option<String>,
    pub restrict_to_existing: bool,
    pub case_sensitive: bool,
    pub limit: Option<Limit>,
    pub transformer: Arc<dyn TagTransformer>,
}

impl ContextPlan {
    /// Owner reference for a record id in this context's shape.
    #[must_use]
    pub fn owner(&self, id: i64) -> Owner {
        match self.scope {
            Scope::Local => Owner::Record { id },
            Scope::Shared => Owner::Typed {
                owner_type: self.taggable.name.clone(),
                id,
            },
        }
    }

    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.scope == Scope::Shared
    }

    /// Whether two plans describe the same context identically.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.taggable == other.taggable
            && self.context == other.context
            && self.label == other.label
            && self.scope == other.scope
            && self.tag_table == other.tag_table
            && self.tagging_table == other.tagging_table
            && self.counter_cache_column == other.counter_cache_column
            && self.restrict_to_existing == other.restrict_to_existing
            && self.case_sensitive == other.case_sensitive
            && limits_match(self.limit.as_ref(), other.limit.as_ref())
            && self.transformer.id() == other.transformer.id()
    }
}

/// Plan one context.
///
/// Local scope derives `{singular type table}_tags` / `_taggings` unless
/// overridden; shared scope always uses the configured global pair.
/// A limit function is stored, never called.
///
/// # Errors
///
/// Returns a configuration error for invalid identifiers or contradictory
/// options (table overrides on a shared context, identical tag and
/// tagging tables).
pub fn plan(
    taggable: &TaggableType,
    context: &str,
    options: &ContextOptions,
    config: &TaggingConfig,
    transformers: &TransformerRegistry,
) -> Result<ContextPlan> {
    taggable.validate()?;

    if !is_identifier(context) {
        return Err(Error::Configuration(format!(
            "context name must be a plain identifier, got '{context}' on {}",
            taggable.name
        )));
    }
    let label = singularize(context);

    let (scope, tag_table, tagging_table) = if options.shared {
        if options.tag_table.is_some() || options.tagging_table.is_some() {
            return Err(Error::Configuration(format!(
                "{}.{context} is shared and cannot override table names; \
                 configure the global tables instead",
                taggable.name
            )));
        }
        config.validate()?;
        (
            Scope::Shared,
            config.tag_table.clone(),
            config.tagging_table.clone(),
        )
    } else {
        let prefix = singularize(&taggable.table);
        let tag_table = options
            .tag_table
            .clone()
            .unwrap_or_else(|| format!("{prefix}_tags"));
        let tagging_table = options
            .tagging_table
            .clone()
            .unwrap_or_else(|| format!("{prefix}_taggings"));
        (Scope::Local, tag_table, tagging_table)
    };

    for table in [&tag_table, &tagging_table] {
        if !is_identifier(table) {
            return Err(Error::Configuration(format!(
                "table name must be a plain identifier, got '{table}'"
            )));
        }
    }
    if tag_table == tagging_table
        || tag_table == taggable.table
        || tagging_table == taggable.table
    {
        return Err(Error::Configuration(format!(
            "{}.{context}: tag, tagging and taggable tables must all differ",
            taggable.name
        )));
    }

    Ok(ContextPlan {
        taggable: taggable.clone(),
        context: context.to_string(),
        label,
        scope,
        tag_table,
        tagging_table,
        counter_cache_column: options.counter_cache.then(|| format!("{context}_count")),
        restrict_to_existing: options.restrict_to_existing,
        case_sensitive: options.case_sensitive,
        limit: options.limit.clone(),
        transformer: transformers.resolve(options.transformer.as_deref()),
    })
}
