//! Shared Error Types
//!
//! Errors that can be produced while building or decoding the shared
//! wire/domain types, independent of any server machinery.
//!
//! # Error Categories
//!
//! - `SerializationError` - JSON encoding/decoding failures
//! - `ValidationError` - a field failed a domain rule
//! - `UnknownValue` - a stored or wire code does not map to a known variant
use thiserror::Error;

/// Shared error types that can occur while handling domain data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },

    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// A code that has no matching variant (e.g. an unknown status code)
    #[error("Unknown {kind} value: {value}")]
    UnknownValue {
        /// Which enumeration was being decoded
        kind: &'static str,
        /// The offending raw value
        value: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new unknown-value error
    pub fn unknown(kind: &'static str, value: impl ToString) -> Self {
        Self::UnknownValue {
            kind,
            value: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
