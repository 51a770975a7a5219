//! Tag transformers: the codec between user input and tag names.
//!
//! A transformer turns a free-form string into an ordered list of names
//! and back. Contexts reference transformers by id; the registry resolves
//! ids once at declaration time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

/// Id of the transformer used when a context does not name one.
pub const DEFAULT_TRANSFORMER: &str = "default";

/// Trait for tag codecs.
///
/// The trait is object-safe so contexts can hold `Arc<dyn TagTransformer>`.
pub trait TagTransformer: Send + Sync {
    /// Stable id the context declaration refers to.
    fn id(&self) -> &str;

    /// Split `input` into tag names, in input order.
    ///
    /// Implementations may return blank or duplicate names;
    /// callers trim, drop blanks and de-duplicate.
    fn parse(&self, input: &str) -> Vec<String>;

    /// Join names back into a single string.
    fn serialize(&self, names: &[String]) -> String;
}

impl fmt::Debug for dyn TagTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagTransformer({})", self.id())
    }
}

/// Separator-based transformer.
#[derive(Debug, Clone)]
pub struct DelimitedTransformer {
    id: String,
    separator: String,
}

impl DelimitedTransformer {
    /// Create a transformer splitting on `separator`.
    #[must_use]
    pub fn new(id: &str, separator: &str) -> Self {
        Self {
            id: id.to_string(),
            separator: separator.to_string(),
        }
    }

    /// The comma-separated default transformer.
    #[must_use]
    pub fn comma() -> Self {
        Self::new(DEFAULT_TRANSFORMER, ",")
    }

    #[must_use]
    pub fn separator(&self) -> &str {
        &self.separator
    }
}

impl TagTransformer for DelimitedTransformer {
    fn id(&self) -> &str {
        &self.id
    }

    fn parse(&self, input: &str) -> Vec<String> {
        input
            .split(self.separator.as_str())
            .map(|s| s.trim().to_string())
            .collect()
    }

    fn serialize(&self, names: &[String]) -> String {
        names.join(&self.separator)
    }
}

/// Registry of transformers by id.
///
/// Always contains the default transformer.
#[derive(Clone)]
pub struct TransformerRegistry {
    by_id: HashMap<String, Arc<dyn TagTransformer>>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&String> = self.by_id.keys().collect();
        ids.sort();
        f.debug_struct("TransformerRegistry").field("ids", &ids).finish()
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut by_id: HashMap<String, Arc<dyn TagTransformer>> = HashMap::new();
        by_id.insert(
            DEFAULT_TRANSFORMER.to_string(),
            Arc::new(DelimitedTransformer::comma()),
        );
        Self { by_id }
    }

    /// Register (or replace) a transformer under its own id.
    pub fn register(&mut self, transformer: Arc<dyn TagTransformer>) {
        self.by_id.insert(transformer.id().to_string(), transformer);
    }

    /// The default transformer.
    #[must_use]
    pub fn default_transformer(&self) -> Arc<dyn TagTransformer> {
        self.get(DEFAULT_TRANSFORMER)
            .unwrap_or_else(|| Arc::new(DelimitedTransformer::comma()))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn TagTransformer>> {
        self.by_id.get(id).cloned()
    }

    /// Resolve `id`, falling back to the default transformer when unknown.
    #[must_use]
    pub fn resolve(&self, id: Option<&str>) -> Arc<dyn TagTransformer> {
        match id {
            None => self.default_transformer(),
            Some(id) => self.get(id).unwrap_or_else(|| {
                warn!(transformer = id, "Unknown transformer, using default");
                self.default_transformer()
            }),
        }
    }
}

/// Trim, drop blanks and de-duplicate, keeping first occurrence order.
#[must_use]
pub fn normalize_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let trimmed = name.as_ref().trim();
        if !trimmed.is_empty() && !out.iter().any(|n| n == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_parse_and_serialize() {
        let t = DelimitedTransformer::comma();
        assert_eq!(t.parse("red, blue ,green"), vec!["red", "blue", "green"]);
        assert_eq!(
            t.serialize(&["red".to_string(), "blue".to_string()]),
            "red,blue"
        );
    }

    #[test]
    fn test_custom_separator() {
        let t = DelimitedTransformer::new("slash", "/");
        assert_eq!(t.parse("a / b/c"), vec!["a", "b", "c"]);
        assert_eq!(t.separator(), "/");
    }

    #[test]
    fn test_registry_fallback() {
        let mut reg = TransformerRegistry::new();
        reg.register(Arc::new(DelimitedTransformer::new("slash", "/")));

        assert_eq!(reg.resolve(Some("slash")).id(), "slash");
        assert_eq!(reg.resolve(None).id(), DEFAULT_TRANSFORMER);
        assert_eq!(reg.resolve(Some("MissingTransformer")).id(), DEFAULT_TRANSFORMER);
    }

    #[test]
    fn test_normalize_names() {
        assert_eq!(
            normalize_names(["red", " red ", "", "  ", "blue", "Red"]),
            vec!["red", "blue", "Red"]
        );
    }
}
