//! Error types for ContextPack.
//!
//! Library crates use [`ContextPackError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-page and per-field failures never surface here: the pipeline turns them
//! into warning strings and empty fields. What remains are request-level
//! failures, each carrying an HTTP-style status via [`ContextPackError::status_code`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One offending request field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Request field name as it appears on the wire (e.g. `companyUrl`).
    pub field: String,
    /// Human-readable problem description.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level error type for all ContextPack operations.
#[derive(Debug, thiserror::Error)]
pub enum ContextPackError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during fetching.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or model-output parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed or missing request fields.
    #[error("validation error: {}", format_fields(.fields))]
    Validation { fields: Vec<FieldError> },

    /// Missing or rejected model-provider credentials.
    #[error("{0}")]
    Credential(String),

    /// The model provider signalled throttling.
    #[error("rate limited by model provider: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Any other model-provider failure.
    #[error("model provider error: {0}")]
    Provider(String),

    /// A requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ContextPackError>;

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ContextPackError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error for a single field.
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            fields: vec![FieldError::new(field, msg)],
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP-style status code for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::RateLimited { .. } => 429,
            Self::NotFound(_) => 404,
            _ => 500,
        }
    }

    /// Whether this failure affects every field of a scan rather than one call.
    ///
    /// The extractor aborts on systemic errors and absorbs everything else.
    pub fn is_systemic(&self) -> bool {
        matches!(self, Self::Credential(_) | Self::RateLimited { .. })
    }

    /// Per-field messages for validation errors; empty for every other kind.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation { fields } => fields,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ContextPackError::config("bad toml");
        assert_eq!(err.to_string(), "config error: bad toml");

        let err = ContextPackError::Validation {
            fields: vec![
                FieldError::new("companyUrl", "is required"),
                FieldError::new("demoMode", "must be a boolean"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "validation error: companyUrl: is required; demoMode: must be a boolean"
        );
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ContextPackError::validation("companyUrl", "x").status_code(), 400);
        assert_eq!(
            ContextPackError::RateLimited {
                message: "slow down".into(),
                retry_after_secs: Some(3),
            }
            .status_code(),
            429
        );
        assert_eq!(ContextPackError::Credential("API key missing".into()).status_code(), 500);
        assert_eq!(ContextPackError::Provider("boom".into()).status_code(), 500);
        assert_eq!(ContextPackError::NotFound("pack x".into()).status_code(), 404);
    }

    #[test]
    fn only_credential_and_rate_limit_are_systemic() {
        assert!(ContextPackError::Credential("k".into()).is_systemic());
        assert!(
            ContextPackError::RateLimited {
                message: "m".into(),
                retry_after_secs: None,
            }
            .is_systemic()
        );
        assert!(!ContextPackError::Provider("p".into()).is_systemic());
        assert!(!ContextPackError::parse("bad json").is_systemic());
    }
}
