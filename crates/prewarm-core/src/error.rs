//! Error types for prewarm-core
//!
//! The variants split into two groups. Everything here stops either the
//! whole run or a single (repository, architecture) pair. A transfer job
//! that exits non-zero is never an `Error`; the dispatcher records it and
//! reverts the tag so the next run retries it.

use thiserror::Error;

/// Result type alias using prewarm-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for prewarm
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid command line or settings combination
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    /// Catalog response did not carry a repository list
    #[error("Unexpected catalog response: {message}")]
    Catalog { message: String },

    /// An external command could not be launched or reported failure
    #[error("Command failed: {message}")]
    Command { message: String },

    /// Invalid regular expression in a filter
    #[error("Invalid filter expression '{expression}': {message}")]
    FilterExpression { expression: String, message: String },

    /// Policy document could not be parsed
    #[error("Failed to parse policy {source_name}: {message}")]
    PolicyParse {
        source_name: String,
        message: String,
    },

    /// Credentials could not be read
    #[error("Invalid credentials: {message}")]
    Credentials { message: String },

    /// HTTP request could not be processed
    #[error("Request failed: {message}")]
    Request { message: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Run was stopped by an interrupt
    #[error("Aborted by interrupt")]
    Interrupted,
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a catalog error
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog {
            message: message.into(),
        }
    }

    /// Create a command error
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Create a filter expression error
    pub fn filter_expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FilterExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a policy parse error
    pub fn policy_parse(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PolicyParse {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a credentials error
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Create a request error
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }
}
