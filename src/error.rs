//! Error types for authtoken
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for authtoken
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Token Errors
    // ============================================================================
    #[error("Malformed token: {message}")]
    MalformedToken { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Invalid token signature")]
    InvalidSignature,

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ============================================================================
    // Transport Errors
    // ============================================================================
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a malformed token error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only connection-level failures are worth retrying at a higher level.
    /// Rejected handshakes and bad tokens never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Result type alias for authtoken
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::malformed("missing signature");
        assert_eq!(err.to_string(), "Malformed token: missing signature");

        let err = Error::invalid_state("token is not set");
        assert_eq!(err.to_string(), "Invalid state: token is not set");

        let err = Error::auth("unexpected status 500");
        assert_eq!(err.to_string(), "Authentication failed: unexpected status 500");

        assert_eq!(Error::InvalidSignature.to_string(), "Invalid token signature");
    }

    #[test]
    fn test_is_retryable() {
        assert!(!Error::auth("rejected").is_retryable());
        assert!(!Error::malformed("bad").is_retryable());
        assert!(!Error::invalid_state("unset").is_retryable());
        assert!(!Error::config("test").is_retryable());
    }
}
