//! Save-time validation of a pending tag set.
//!
//! Both checks run independently, so a single save can report a limit
//! failure and missing tags at once.

use crate::error::{Error, Result};
use crate::schema::ContextPlan;
use crate::storage::wiring;
use rusqlite::Connection;
use std::any::Any;
use std::fmt;
use tracing::warn;

/// A recoverable problem recorded on a tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The pending set is larger than the context limit.
    LimitExceeded { limit: usize, attempted: usize },
    /// Restricted context: these names match no existing tag.
    UnknownTags { names: Vec<String> },
    /// The owning record could not be inserted.
    ParentNotSaved(String),
    /// A storage step failed and the save was rolled back.
    Persistence(String),
}

impl TagError {
    /// Validation failures, as opposed to storage failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. } | Self::UnknownTags { .. })
    }
}

impl fmt::Display for TagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitExceeded { limit, attempted } => write!(
                f,
                "Cannot have more than {limit} tags (attempting to save {attempted})"
            ),
            Self::UnknownTags { names } => {
                write!(f, "The following tags do not exist: {}", names.join(", "))
            }
            Self::ParentNotSaved(reason) => write!(f, "Failed to save parent record: {reason}"),
            Self::Persistence(reason) => f.write_str(reason),
        }
    }
}

/// Resolve the context limit for `record`.
///
/// A per-record limit that does not accept the record's type counts as
/// no limit.
pub(crate) fn resolve_limit(plan: &ContextPlan, record: &dyn Any) -> Option<usize> {
    let limit = plan.limit.as_ref()?;
    let resolved = limit.resolve(record);
    if resolved.is_none() {
        warn!(
            taggable = %plan.taggable.name,
            context = %plan.context,
            "Limit function does not accept this record type, ignoring limit"
        );
    }
    resolved
}

/// Limit check against the target set.
#[must_use]
pub fn check_limit(plan: &ContextPlan, record: &dyn Any, target: &[String]) -> Option<TagError> {
    let limit = resolve_limit(plan, record)?;
    (target.len() > limit).then(|| TagError::LimitExceeded {
        limit,
        attempted: target.len(),
    })
}

/// Existing-tag check: every name must match a stored tag ignoring case.
///
/// Only ASCII letters fold, as with SQLite's `LOWER`: `Élan` and `élan`
/// are different tags.
///
/// # Errors
///
/// Returns an error if the lookup query fails.
pub fn check_existing(
    conn: &Connection,
    plan: &ContextPlan,
    target: &[String],
) -> Result<Option<TagError>> {
    if !plan.restrict_to_existing || target.is_empty() {
        return Ok(None);
    }
    let existing: Vec<String> = wiring::existing_names_ignoring_case(conn, plan, target)?
        .into_iter()
        .map(|n| n.to_ascii_lowercase())
        .collect();
    let missing: Vec<String> = target
        .iter()
        .filter(|n| !existing.contains(&n.to_ascii_lowercase()))
        .cloned()
        .collect();
    Ok((!missing.is_empty()).then_some(TagError::UnknownTags { names: missing }))
}

/// Run every check against `target`.
///
/// # Errors
///
/// Returns an error if a lookup query fails.
pub fn validate(
    conn: &Connection,
    plan: &ContextPlan,
    record: &dyn Any,
    target: &[String],
) -> Result<Vec<TagError>> {
    let mut errors = Vec::new();
    errors.extend(check_limit(plan, record, target));
    errors.extend(check_existing(conn, plan, target)?);
    Ok(errors)
}

/// Turn recorded problems into the error raised by strict saves.
#[must_use]
pub fn into_error<'a, I>(errors: I) -> Error
where
    I: IntoIterator<Item = &'a TagError>,
{
    let errors: Vec<&TagError> = errors.into_iter().collect();
    if errors.is_empty() {
        return Error::Persistence("save failed without a recorded cause".to_string());
    }
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    if errors.iter().all(|e| e.is_validation()) {
        Error::Validation { messages }
    } else {
        Error::Persistence(messages.join("; "))
    }
}
