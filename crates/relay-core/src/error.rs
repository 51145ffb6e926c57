//! Unified error types for AgentRelay.
//!
//! All crates map their internal errors into [`RelayError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the reliability layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A configuration error occurred (bad value, unknown algorithm name).
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A compression backend failed.
    Compression,
    /// Decompressing a payload failed beyond recovery.
    Decompression,
    /// An injected transport capability (send/connect/lookup) failed.
    Transport,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Compression => write!(f, "COMPRESSION"),
            Self::Decompression => write!(f, "DECOMPRESSION"),
            Self::Transport => write!(f, "TRANSPORT"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout AgentRelay.
///
/// Crate-specific errors are mapped into `RelayError` using `From` impls
/// or explicit `.map_err()` calls so the whole layer exposes one error
/// type at its boundary.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct RelayError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl RelayError {
    /// Create a new error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    /// Create a compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Compression, message)
    }

    /// Create a decompression error.
    pub fn decompression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decompression, message)
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for RelayError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Compression, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

impl From<base64::DecodeError> for RelayError {
    fn from(err: base64::DecodeError) -> Self {
        Self::with_source(
            ErrorKind::Decompression,
            format!("Base64 decode error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = RelayError::configuration("unsupported algorithm: snappy");
        assert_eq!(
            err.to_string(),
            "CONFIGURATION: unsupported algorithm: snappy"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: RelayError = parse_err.into();
        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(err.source.is_some());
    }

    #[test]
    fn test_clone_drops_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = RelayError::with_source(ErrorKind::Compression, "gzip failed", io);
        let cloned = err.clone();
        assert_eq!(cloned.kind, ErrorKind::Compression);
        assert!(cloned.source.is_none());
    }
}
