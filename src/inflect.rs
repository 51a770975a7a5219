//! Identifier inflection for table names and context labels.
//!
//! Context names are plural (`colors`, `special_needs`) while the
//! `context` column stores the singular label (`color`, `special_need`).
//! Only the last `_`-separated word is inflected.

use std::collections::HashMap;
use std::sync::LazyLock;

// ── Irregular forms ──────────────────────────────────────────

static IRREGULAR_SINGULARS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("people", "person"),
        ("men", "man"),
        ("women", "woman"),
        ("children", "child"),
        ("mice", "mouse"),
        ("geese", "goose"),
        ("feet", "foot"),
        ("teeth", "tooth"),
    ]
    .into_iter()
    .collect()
});

/// Words that are the same in singular and plural.
static UNCOUNTABLE: LazyLock<Vec<&str>> = LazyLock::new(|| {
    vec![
        "equipment", "information", "rice", "money", "species", "series", "fish", "sheep",
        "news", "data", "metadata",
    ]
});

/// Singularize the last word of a snake_case identifier.
#[must_use]
pub fn singularize(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(idx) => (&word[..=idx], &word[idx + 1..]),
        None => ("", word),
    };
    format!("{head}{}", singularize_word(last))
}

fn singularize_word(word: &str) -> String {
    let lower = word.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some(&singular) = IRREGULAR_SINGULARS.get(lower.as_str()) {
        return singular.to_string();
    }

    if lower.len() > 3 && lower.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    for suffix in ["sses", "shes", "ches", "xes", "zzes"] {
        if lower.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if lower.ends_with("ss") || lower.ends_with("us") || lower.ends_with("is") {
        return word.to_string();
    }
    if lower.len() > 1 && lower.ends_with('s') {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Pluralize the last word of a snake_case identifier.
#[must_use]
pub fn pluralize(word: &str) -> String {
    let (head, last) = match word.rfind('_') {
        Some(idx) => (&word[..=idx], &word[idx + 1..]),
        None => ("", word),
    };
    let lower = last.to_lowercase();

    let plural = if UNCOUNTABLE.contains(&lower.as_str()) {
        last.to_string()
    } else if let Some((&plural, _)) = IRREGULAR_SINGULARS.iter().find(|(_, s)| **s == lower) {
        plural.to_string()
    } else if lower.ends_with('y')
        && !matches!(lower.chars().rev().nth(1), Some('a' | 'e' | 'i' | 'o' | 'u'))
    {
        format!("{}ies", &last[..last.len() - 1])
    } else if ["s", "sh", "ch", "x", "z"].iter().any(|s| lower.ends_with(s)) {
        format!("{last}es")
    } else {
        format!("{last}s")
    };

    format!("{head}{plural}")
}

/// Convert a `CamelCase` (optionally `::`-namespaced) name to snake_case.
///
/// `Military::Carrier` becomes `military_carrier`.
#[must_use]
pub fn underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for segment in name.split("::") {
        if !out.is_empty() {
            out.push('_');
            prev_lower = false;
        }
        for ch in segment.chars() {
            if ch.is_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.extend(ch.to_lowercase());
                prev_lower = false;
            } else {
                out.push(ch);
                prev_lower = ch.is_alphanumeric();
            }
        }
    }
    out
}

/// Table name for a record class name: `CarTag` ⇒ `car_tags`,
/// `Car::Tagging` ⇒ `car_taggings`.
#[must_use]
pub fn tableize(class_name: &str) -> String {
    pluralize(&underscore(class_name))
}

/// Whether `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`).
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singularize_context_labels() {
        assert_eq!(singularize("colors"), "color");
        assert_eq!(singularize("special_needs"), "special_need");
        assert_eq!(singularize("meal_preferences"), "meal_preference");
        assert_eq!(singularize("excuses"), "excuse");
        assert_eq!(singularize("dietary_requirements"), "dietary_requirement");
        assert_eq!(singularize("mission_types"), "mission_type");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("color"), "color");
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize("car_tag"), "car_tags");
        assert_eq!(pluralize("tagging"), "taggings");
        assert_eq!(pluralize("company"), "companies");
        assert_eq!(pluralize("bus"), "buses");
        assert_eq!(pluralize("person"), "people");
        assert_eq!(pluralize("day"), "days");
    }

    #[test]
    fn test_tableize() {
        assert_eq!(tableize("CarTag"), "car_tags");
        assert_eq!(tableize("Car::Tagging"), "car_taggings");
        assert_eq!(tableize("Military::CarrierTag"), "military_carrier_tags");
        assert_eq!(tableize("ApplicationTagging"), "application_taggings");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("car_tags"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("car tags"));
        assert!(!is_identifier("tags\"; DROP"));
        assert!(!is_identifier(""));
    }
}
