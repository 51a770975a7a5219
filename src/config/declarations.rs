//! Declaration files.
//!
//! A declarations file lists taggable types and their contexts:
//!
//! ```json
//! {
//!   "types": [
//!     {
//!       "name": "Passenger",
//!       "table": "passengers",
//!       "contexts": {
//!         "special_needs": { "counter_cache": true },
//!         "excuses": { "shared": true }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Context options are parsed with [`ContextOptions::from_json`], so
//! unknown option keys are ignored.

use crate::error::{Error, Result};
use crate::model::TaggableType;
use crate::schema::{ContextOptions, ContextPlan, Registry};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// One taggable type and its contexts, in file order.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeDeclaration {
    #[serde(flatten)]
    pub taggable: TaggableType,
    #[serde(default)]
    pub contexts: Map<String, Value>,
}

/// Parsed declarations file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Declarations {
    #[serde(default)]
    pub types: Vec<TypeDeclaration>,
}

impl std::str::FromStr for Declarations {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| Error::Configuration(format!("Failed to parse declarations: {e}")))
    }
}

impl Declarations {
    /// Read a declarations file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read declarations {}: {e}",
                path.display()
            ))
        })?;
        content.parse()
    }

    /// Declare every context on `registry`, in file order.
    ///
    /// Stops at the first invalid context; contexts declared before it
    /// stay registered.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error.
    pub fn apply(&self, registry: &mut Registry) -> Result<Vec<Arc<ContextPlan>>> {
        let mut plans = Vec::new();
        for decl in &self.types {
            for (context, value) in &decl.contexts {
                let options = ContextOptions::from_json(value).map_err(|e| match e {
                    Error::Configuration(msg) => {
                        Error::Configuration(format!("{}.{context}: {msg}", decl.taggable.name))
                    }
                    other => other,
                })?;
                plans.extend(registry.declare(&decl.taggable, &[context.as_str()], &options)?);
            }
        }
        info!(
            types = self.types.len(),
            contexts = plans.len(),
            "Applied tag declarations"
        );
        Ok(plans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaggingConfig;
    use crate::schema::Scope;

    const AIRLINE: &str = r#"{
        "types": [
            {
                "name": "Passenger",
                "table": "passengers",
                "contexts": {
                    "special_needs": { "counter_cache": true },
                    "meal_preferences": { "restrict_to_existing": true, "dependent": "destroy" },
                    "excuses": { "polymorphic": true }
                }
            },
            {
                "name": "Person",
                "table": "people",
                "primary_key": "person_id",
                "contexts": { "skills": null }
            }
        ]
    }"#;

    #[test]
    fn test_apply_in_file_order() {
        let decls: Declarations = AIRLINE.parse().unwrap();
        let mut registry = Registry::new(TaggingConfig::default());
        let plans = decls.apply(&mut registry).unwrap();

        assert_eq!(plans.len(), 4);
        assert_eq!(
            registry.contexts("Passenger"),
            vec!["special_needs", "meal_preferences", "excuses"]
        );
        assert_eq!(
            registry.plan("Passenger", "excuses").unwrap().scope,
            Scope::Shared
        );
        let skills = registry.plan("Person", "skills").unwrap();
        assert_eq!(skills.taggable.primary_key, "person_id");
        assert_eq!(skills.tag_table, "person_tags");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        fs::write(&path, AIRLINE).unwrap();

        let decls = Declarations::load(&path).unwrap();
        assert_eq!(decls.types.len(), 2);
        assert!(Declarations::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_bad_option_names_context() {
        let decls: Declarations = r#"{"types": [{"name": "Car", "table": "cars",
            "contexts": {"colors": {"limit": "three"}}}]}"#
            .parse()
            .unwrap();
        let err = decls
            .apply(&mut Registry::new(TaggingConfig::default()))
            .unwrap_err();
        assert!(err.to_string().contains("Car.colors"));
    }

    #[test]
    fn test_malformed_json() {
        let result: Result<Declarations> = "{ nope".parse();
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
