//! Error types for progress aggregation.
//!
//! Transport failures are fatal to the worker that hits them and are never
//! retried. Configuration errors are raised at construction time.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the progress subsystem.
#[derive(Debug, Error)]
pub enum ProgressError {
    // Transport errors
    #[error("Progress channel unavailable at {addr:?}: {message}")]
    TransportUnavailable {
        addr: Option<SocketAddr>,
        message: String,
    },

    // Configuration errors
    #[error("Configuration error for {field}: {message}")]
    Configuration { field: String, message: String },

    // Validation errors (malformed frames, bad arguments at call sites)
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Liveness
    #[error(
        "Progress stalled: {completed}/{expected} workers completed, no message for {idle:?}"
    )]
    StalledCompletion {
        completed: u64,
        expected: u64,
        idle: Duration,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

impl From<std::io::Error> for ProgressError {
    fn from(err: std::io::Error) -> Self {
        ProgressError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for ProgressError {
    fn from(err: serde_json::Error) -> Self {
        ProgressError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl ProgressError {
    /// Build a `TransportUnavailable` error from an IO failure on the channel.
    pub fn transport(addr: Option<SocketAddr>, err: impl std::fmt::Display) -> Self {
        ProgressError::TransportUnavailable {
            addr,
            message: err.to_string(),
        }
    }

    /// Build a `Configuration` error.
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        ProgressError::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }
}
