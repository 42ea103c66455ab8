//! Core error types for Parley.
//!
//! All errors are explicit, typed, and recoverable.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for configuration and identifier handling.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("JSON parse error: {reason}")]
    JsonParseFailed { reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    #[error("TOML serialize error: {reason}")]
    TomlSerializeFailed { reason: String },

    #[error("invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl Into<String>) -> Self {
        Self::TomlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a TOML serialize error.
    pub fn toml_serialize_failed(reason: impl Into<String>) -> Self {
        Self::TomlSerializeFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::file_read_failed("/tmp/parley.toml", "permission denied");
        assert!(err.to_string().contains("/tmp/parley.toml"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_invalid_identifier_display() {
        let err = Error::invalid_identifier("", "planner id must not be empty");
        assert!(err.to_string().contains("must not be empty"));
    }
}
