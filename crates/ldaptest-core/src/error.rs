//! Error types for credential verification.
//!
//! A single error enum covers configuration loading and the outcome of bind attempts. Variants
//! carry plain strings so errors stay `Clone` and can be handed back to callers as data.

use thiserror::Error;

/// Main error type for configuration and authentication operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A configuration field is missing or invalid
    #[error("Configuration error in `{field}`: {message}")]
    Config {
        /// Name of the offending field as it appears in the JSON source
        field: String,
        /// What is wrong with the field
        message: String,
    },

    /// The configuration source is not valid JSON for the expected shape
    #[error("Malformed configuration: {0}")]
    ConfigParse(String),

    /// Reading the configuration source failed
    #[error("I/O error: {0}")]
    Io(String),

    /// A check was requested before any configuration was loaded
    #[error("No directory configuration has been loaded")]
    NotLoaded,

    /// Credentials were empty or rejected by the directory service
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The directory service could not be reached or answered with an unexpected error
    #[error("Endpoint unreachable: {0}")]
    EndpointUnreachable(String),

    /// The directory service did not answer within the configured timeout
    #[error("Timeout waiting for directory service: {0}")]
    Timeout(String),

    /// The caller cancelled the attempt
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized result type for verification operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Builds a [`Error::Config`] for the given field.
    #[must_use]
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } | Self::ConfigParse(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::NotLoaded => "NOT_LOADED",
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::EndpointUnreachable(_) => "ENDPOINT_UNREACHABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the offending field name for configuration errors.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Config { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns true for errors raised while loading or validating configuration.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::ConfigParse(_) | Self::Io(_))
    }

    /// Returns true if this error points at the deployment rather than the presented credentials.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::Internal(_)
                | Self::Config { .. }
                | Self::ConfigParse(_)
                | Self::NotLoaded
                | Self::EndpointUnreachable(_)
                | Self::Timeout(_)
        )
    }
}

// Conversions from external error types
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Self::Io(err.to_string())
        } else {
            Self::ConfigParse(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        // Report the first offending field in a stable order.
        let mut fields = err
            .field_errors()
            .into_iter()
            .map(|(field, issues)| {
                let message = issues
                    .iter()
                    .map(|issue| {
                        issue
                            .message
                            .as_ref()
                            .map_or_else(|| issue.code.to_string(), ToString::to_string)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                (field.to_string(), message)
            })
            .collect::<Vec<_>>();
        fields.sort();

        match fields.into_iter().next() {
            Some((field, message)) => Self::Config { field, message },
            None => Self::ConfigParse(err.to_string()),
        }
    }
}
