//! Error types for protocol operations
//!
//! Provides error types for serialization, frame validation and schema checks.

use std::fmt;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// JSON serialization/deserialization error
    SerializationError(String),

    /// Invalid message format
    InvalidMessage(String),

    /// Missing required field
    MissingField(String),

    /// Invalid control request
    InvalidControlRequest(String),

    /// Hook matcher could not be built
    InvalidMatcher(String),

    /// A value did not satisfy a JSON schema
    SchemaViolation(Vec<String>),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            Self::MissingField(field) => write!(f, "Missing required field: {}", field),
            Self::InvalidControlRequest(msg) => write!(f, "Invalid control request: {}", msg),
            Self::InvalidMatcher(msg) => write!(f, "Invalid hook matcher: {}", msg),
            Self::SchemaViolation(errors) => {
                write!(f, "Schema violation: {}", errors.join("; "))
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
