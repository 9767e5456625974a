//! Error types for the Gatekeeper service.

use thiserror::Error;

/// Main error type for Gatekeeper operations.
///
/// Per-request rate limit checks never produce one of these; they always
/// resolve to a [`Verdict`](crate::ratelimit::Verdict). Errors only surface
/// from configuration, policy registration and the service plumbing.
#[derive(Error, Debug)]
pub enum GatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy definition failed validation
    #[error("Invalid policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },

    /// The policy table has no `default` policy to fall back on
    #[error("No '{0}' policy registered")]
    MissingDefaultPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatekeeperError {
    pub(crate) fn invalid_policy(name: &str, reason: impl Into<String>) -> Self {
        GatekeeperError::InvalidPolicy {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for GatekeeperError {
    fn from(err: config::ConfigError) -> Self {
        GatekeeperError::Config(err.to_string())
    }
}

/// Result type alias for Gatekeeper operations.
pub type Result<T> = std::result::Result<T, GatekeeperError>;
