//! Configuration errors

use thiserror::Error;

/// Errors raised while validating invocation parameters
///
/// These are always fatal and are detected before any engine or HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required parameter was not provided (or is blank)
    #[error("missing required configuration: {field}")]
    Missing { field: &'static str },

    /// A parameter was provided but is malformed
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn missing(field: &'static str) -> Self {
        Self::Missing { field }
    }

    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending parameter
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }
}
