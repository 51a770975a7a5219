//! Registry of declared tag contexts.
//!
//! The registry is the typed replacement for per-class generated
//! accessors: a `ContextPlan` per (taggable type, context name), looked up
//! by the generic proxy and query code. Build it once at startup, then
//! share it read-only behind an `Arc`.

use super::options::ContextOptions;
use super::plan::{plan, ContextPlan, Scope};
use crate::config::TaggingConfig;
use crate::error::{Error, Result};
use crate::model::TaggableType;
use crate::transform::{TagTransformer, TransformerRegistry};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Declared taggable types and their context plans.
#[derive(Debug, Default)]
pub struct Registry {
    config: TaggingConfig,
    transformers: TransformerRegistry,
    types: BTreeMap<String, TaggableType>,
    /// Plans in declaration order.
    plans: Vec<Arc<ContextPlan>>,
    index: HashMap<(String, String), usize>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: TaggingConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &TaggingConfig {
        &self.config
    }

    #[must_use]
    pub fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    /// Register a transformer so declarations can refer to it by id.
    ///
    /// Contexts already declared keep the transformer they resolved.
    pub fn register_transformer(&mut self, transformer: Arc<dyn TagTransformer>) {
        self.transformers.register(transformer);
    }

    /// Declare one or more contexts on `taggable` with a shared option set.
    ///
    /// All contexts are planned before any is registered, so a failing
    /// declaration leaves the registry unchanged. Re-declaring an identical
    /// context returns the existing plan.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if planning fails, if the type was
    /// previously declared with a different table, if a context is
    /// re-declared with different options, or if a local tagging table
    /// would be shared with another type.
    pub fn declare(
        &mut self,
        taggable: &TaggableType,
        contexts: &[&str],
        options: &ContextOptions,
    ) -> Result<Vec<Arc<ContextPlan>>> {
        if let Some(existing) = self.types.get(&taggable.name) {
            if existing != taggable {
                return Err(Error::Configuration(format!(
                    "{} was already declared with table '{}'",
                    taggable.name, existing.table
                )));
            }
        }

        let mut planned = Vec::with_capacity(contexts.len());
        for context in contexts {
            let candidate = plan(taggable, context, options, &self.config, &self.transformers)?;
            let key = (taggable.name.clone(), (*context).to_string());
            if planned.iter().any(|(k, _)| k == &key) {
                continue;
            }

            match self.index.get(&key) {
                Some(&idx) if self.plans[idx].same_identity(&candidate) => {
                    debug!(taggable = %taggable.name, context, "Context already declared");
                    planned.push((key, None));
                }
                Some(_) => {
                    return Err(Error::Configuration(format!(
                        "{}.{context} is already declared with different options",
                        taggable.name
                    )));
                }
                None => {
                    self.check_table_ownership(&candidate)?;
                    planned.push((key, Some(candidate)));
                }
            }
        }

        self.types
            .entry(taggable.name.clone())
            .or_insert_with(|| taggable.clone());

        let mut result = Vec::with_capacity(planned.len());
        for (key, candidate) in planned {
            if let Some(candidate) = candidate {
                info!(
                    taggable = %candidate.taggable.name,
                    context = %candidate.context,
                    scope = candidate.scope.as_str(),
                    tag_table = %candidate.tag_table,
                    tagging_table = %candidate.tagging_table,
                    "Declared tag context"
                );
                self.index.insert(key.clone(), self.plans.len());
                self.plans.push(Arc::new(candidate));
            }
            result.push(Arc::clone(&self.plans[self.index[&key]]));
        }
        Ok(result)
    }

    /// Local tagging tables have no owner-type column, so they must belong
    /// to exactly one taggable type and never double as a shared table.
    fn check_table_ownership(&self, candidate: &ContextPlan) -> Result<()> {
        for other in &self.plans {
            if other.tagging_table != candidate.tagging_table {
                continue;
            }
            let conflict = match (candidate.scope, other.scope) {
                (Scope::Shared, Scope::Shared) => false,
                (Scope::Local, Scope::Local) => other.taggable.name != candidate.taggable.name,
                _ => true,
            };
            if conflict {
                return Err(Error::Configuration(format!(
                    "tagging table '{}' is already used by {}.{} ({})",
                    candidate.tagging_table,
                    other.taggable.name,
                    other.context,
                    other.scope.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Look up the plan for (type, context).
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` or `UnknownContext` when not declared.
    pub fn plan(&self, taggable: &str, context: &str) -> Result<&Arc<ContextPlan>> {
        if !self.types.contains_key(taggable) {
            return Err(Error::UnknownType {
                name: taggable.to_string(),
            });
        }
        self.index
            .get(&(taggable.to_string(), context.to_string()))
            .map(|&idx| &self.plans[idx])
            .ok_or_else(|| Error::UnknownContext {
                taggable: taggable.to_string(),
                context: context.to_string(),
            })
    }

    /// Look up a declared taggable type.
    ///
    /// # Errors
    ///
    /// Returns `UnknownType` when the type has no declared contexts.
    pub fn taggable(&self, name: &str) -> Result<&TaggableType> {
        self.types.get(name).ok_or_else(|| Error::UnknownType {
            name: name.to_string(),
        })
    }

    /// Context names declared on a type, in declaration order.
    #[must_use]
    pub fn contexts(&self, taggable: &str) -> Vec<&str> {
        self.plans
            .iter()
            .filter(|p| p.taggable.name == taggable)
            .map(|p| p.context.as_str())
            .collect()
    }

    /// All plans in declaration order.
    pub fn plans(&self) -> impl Iterator<Item = &Arc<ContextPlan>> {
        self.plans.iter()
    }

    /// All declared taggable types, sorted by name.
    pub fn taggables(&self) -> impl Iterator<Item = &TaggableType> {
        self.types.values()
    }
}
