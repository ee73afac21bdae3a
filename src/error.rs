//! Error types for the Calypso cohort system
//!
//! This module provides comprehensive error handling using thiserror for
//! structured error definitions and anyhow for error propagation. Every
//! externally visible failure maps to an HTTP-style status code; internal
//! failures are sanitized before leaving the process.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Calypso operations
#[derive(Error, Debug)]
pub enum CalypsoError {
    /// Malformed request shape (empty fields, bad ranges, invalid events)
    #[error("Validation error: {0}")]
    Validation(String),

    /// API key missing, unknown, inactive, or expired
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Key exists but lacks the domain binding or permission for the request
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// One of the sliding rate-limit windows is exhausted
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Request timestamp too old (or too far ahead) to be a live call
    #[error("Replay protection: {0}")]
    Replay(String),

    /// Taxonomy source data is malformed (fatal at load time)
    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    /// Key/value storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Encryption provider failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal failure (sanitized before returning to callers)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Calypso operations
pub type Result<T> = std::result::Result<T, CalypsoError>;

impl CalypsoError {
    /// HTTP-style status code for this error category
    pub fn http_status(&self) -> u16 {
        match self {
            CalypsoError::Validation(_) | CalypsoError::Replay(_) => 400,
            CalypsoError::Authentication(_) => 401,
            CalypsoError::Authorization(_) => 403,
            CalypsoError::RateLimit(_) => 429,
            CalypsoError::Taxonomy(_)
            | CalypsoError::Storage(_)
            | CalypsoError::Encryption(_)
            | CalypsoError::Config(_)
            | CalypsoError::Io(_)
            | CalypsoError::Serialization(_)
            | CalypsoError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable category name
    pub fn kind(&self) -> &'static str {
        match self {
            CalypsoError::Validation(_) => "validation_error",
            CalypsoError::Authentication(_) => "authentication_error",
            CalypsoError::Authorization(_) => "authorization_error",
            CalypsoError::RateLimit(_) => "rate_limit_error",
            CalypsoError::Replay(_) => "replay_error",
            CalypsoError::Taxonomy(_)
            | CalypsoError::Storage(_)
            | CalypsoError::Encryption(_)
            | CalypsoError::Config(_)
            | CalypsoError::Io(_)
            | CalypsoError::Serialization(_)
            | CalypsoError::Internal(_) => "internal_error",
        }
    }

    /// Client-safe view of this error
    ///
    /// Internal categories collapse to a generic message; everything the
    /// operator needs is logged server-side before this conversion.
    pub fn to_body(&self) -> ErrorBody {
        let message = if self.http_status() == 500 {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };
        ErrorBody {
            kind: self.kind().to_string(),
            message,
            http_status: self.http_status(),
        }
    }
}

/// Tagged error payload returned to external callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error category (e.g. `rate_limit_error`)
    pub kind: String,

    /// Human-readable message, sanitized for internal errors
    pub message: String,

    /// HTTP-style status code
    pub http_status: u16,
}

/// Convert anyhow::Error to CalypsoError
impl From<anyhow::Error> for CalypsoError {
    fn from(err: anyhow::Error) -> Self {
        CalypsoError::Internal(err.to_string())
    }
}
