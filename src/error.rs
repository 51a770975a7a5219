//! Error types for nofly.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Retryability flags for callers that correct their input
//! - Context-aware recovery hints
//!
//! Proxy validation problems are *not* errors: `save()` records them as
//! [`crate::proxy::TagError`] values and returns `false`. Only the strict
//! variants turn them into [`Error::Validation`] / [`Error::Persistence`].

use thiserror::Error;

/// Result type alias for nofly operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Declaration
    ConfigurationError,
    UnknownType,
    UnknownContext,

    // Proxy save
    ValidationFailed,
    PersistenceFailed,

    // Storage
    DatabaseError,

    // I/O
    IoError,
    JsonError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::UnknownType => "UNKNOWN_TYPE",
            Self::UnknownContext => "UNKNOWN_CONTEXT",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
        }
    }

    /// Whether retrying with corrected input can succeed.
    ///
    /// True for validation failures (too many tags, unknown tags) and
    /// transient storage failures. Declaration errors are fatal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed | Self::PersistenceFailed | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in nofly operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown taggable type: {name}")]
    UnknownType { name: String },

    #[error("Unknown tag context '{context}' on {taggable}")]
    UnknownContext { taggable: String, context: String },

    #[error("Validation failed: {}", messages.join("; "))]
    Validation { messages: Vec<String> },

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::ConfigurationError,
            Self::UnknownType { .. } => ErrorCode::UnknownType,
            Self::UnknownContext { .. } => ErrorCode::UnknownContext,
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::Persistence(_) => ErrorCode::PersistenceFailed,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
        }
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnknownType { name } => Some(format!(
                "Declare at least one context for '{name}' with `Registry::declare` before use."
            )),
            Self::UnknownContext { taggable, context } => Some(format!(
                "'{context}' is not declared on {taggable}. Check `Registry::contexts(\"{taggable}\")`."
            )),
            Self::Validation { messages } => {
                if messages.iter().any(|m| m.starts_with("Cannot have more than")) {
                    Some("Remove tags or raise the context limit.".to_string())
                } else if messages.iter().any(|m| m.contains("do not exist")) {
                    Some(
                        "The context only accepts existing tags. Create the tag rows first."
                            .to_string(),
                    )
                } else {
                    None
                }
            }
            Self::Configuration(_)
            | Self::Persistence(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_) => None,
        }
    }

    /// True when the underlying SQLite error is a constraint violation.
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
