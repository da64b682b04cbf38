//! Error types for the bestip workflow
//!
//! Each variant maps to one failure class of the workflow. Configuration
//! errors are raised before any I/O and always name the flag that fixes them.

use thiserror::Error;

/// Result type alias for bestip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the bestip workflow
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration (always fatal, always actionable)
    #[error("Configuration error: {message}{}", flag_hint(.flag))]
    Configuration {
        /// What is wrong
        message: String,
        /// The command-line flag that supplies the missing or invalid value
        flag: Option<String>,
    },

    /// The external measurement tool failed to run
    #[error("Execution error: {0}")]
    Execution(String),

    /// A measurement artifact could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A DNS provider call failed
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Inputs were well-formed but cannot produce a valid plan
    #[error("Validation error: {0}")]
    Validation(String),

    /// No measured endpoint met the selection thresholds
    #[error("No endpoint met the selection criteria ({measured} measured)")]
    EmptySelection {
        /// Number of records that were measured before filtering
        measured: usize,
    },

    /// The run was cancelled or its deadline passed
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// A looked-up resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

fn flag_hint(flag: &Option<String>) -> String {
    match flag {
        Some(flag) => format!(" (supply it with {})", flag),
        None => String::new(),
    }
}

impl Error {
    /// Create a configuration error without a remedy flag
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            flag: None,
        }
    }

    /// Create a configuration error naming the flag that fixes it
    pub fn configuration_flag(msg: impl Into<String>, flag: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            flag: Some(flag.into()),
        }
    }

    /// Create an execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
