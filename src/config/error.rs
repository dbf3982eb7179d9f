//! Configuration Error Types
//!
//! Specific, actionable error messages for configuration loading and
//! validation failures.

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },

    /// A configuration source could not be read or parsed
    #[error("Failed to load configuration from {source_name}: {error}")]
    LoadFailed { source_name: String, error: String },

    /// The merged configuration does not match the expected shape
    #[error("Failed to deserialize configuration: {error}")]
    Deserialization { error: String },
}

impl ConfigurationError {
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }

    pub fn load_failed(source_name: impl Into<String>, error: impl ToString) -> Self {
        Self::LoadFailed {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
