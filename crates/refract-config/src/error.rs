//! Error types for configuration operations.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid value for '{field}' in '{section}': {reason}")]
    InvalidField {
        /// Section that failed validation.
        section: &'static str,
        /// Field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// A field required by the consumer was not configured.
    #[error("missing required field '{field}' in '{section}'")]
    MissingField {
        /// Section the field belongs to.
        section: &'static str,
        /// Name of the missing field.
        field: &'static str,
    },
    /// An environment variable held a value that is not valid unicode.
    #[error("environment variable '{name}' is not valid unicode")]
    EnvNotUnicode {
        /// Name of the offending variable.
        name: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
