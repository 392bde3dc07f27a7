//! Error types for logweave

use std::fmt;

/// Result type alias for logweave operations
pub type Result<T, E = LogweaveError> = std::result::Result<T, E>;

/// Errors surfaced while configuring or building the logging pipeline.
///
/// Nothing on the request path returns this type: enrichment, formatting and
/// sink delivery recover locally. These errors only appear at startup.
#[derive(Debug, thiserror::Error)]
pub enum LogweaveError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Environment variable deserialization failed.
    #[error("Environment configuration error: {0}")]
    Env(#[from] envy::Error),

    /// Filesystem failure while preparing a sink.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A sink could not be constructed.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by a sink while delivering one event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The destination could not be written to.
    #[error("Failed to write to {sink}: {message}")]
    Write {
        /// Sink name
        sink: String,
        /// Failure description
        message: String,
    },

    /// The destination is not reachable right now.
    #[error("Sink {0} is unavailable")]
    Unavailable(String),

    /// The sink's internal queue is full; the event was dropped.
    #[error("Sink {0} queue is full")]
    QueueFull(String),

    /// The event could not be serialized for the wire.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SinkError {
    /// Create a write error for the named sink
    pub fn write(sink: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Write {
            sink: sink.into(),
            message: message.to_string(),
        }
    }
}

/// A recovered enricher fault.
///
/// Enrichers return this instead of panicking; the composite turns it into an
/// `<Name>_Error` property and moves on to the next enricher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{enricher} failed: {message}")]
pub struct EnrichError {
    /// Name of the enricher that failed
    pub enricher: String,
    /// Failure description
    pub message: String,
}

impl EnrichError {
    /// Create a new enrichment error
    pub fn new(enricher: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            enricher: enricher.into(),
            message: message.to_string(),
        }
    }
}
