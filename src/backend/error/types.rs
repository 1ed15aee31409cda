/**
 * Backend Error Types
 *
 * This module defines the error taxonomy shared by the membership store,
 * the participant service, the message bus and the session relay.
 *
 * # Error Categories
 *
 * ## Domain Errors
 *
 * - `ConversationNotFound` - the conversation is absent or the caller is
 *   not a member (existence is never leaked to non-members)
 * - `ParticipantNotFound` - the target participant row is absent
 * - `UserNotFound` - a referenced user does not exist
 * - `AlreadyExists` - duplicate creation
 * - `ForbiddenAction` - a member lacks the role the action needs
 * - `IllegalTransition` - the status matrix rejected a change
 *
 * ## Infrastructure Errors
 *
 * - `Transient` - database, I/O or event-sink failure with no domain meaning
 * - `ProtocolError` - a wire frame could not be decoded
 * - `Unauthorized` - missing or invalid credentials
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::shared::{ParticipantStatus, SharedError};

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("conversation not found")]
    ConversationNotFound,

    #[error("participant not found")]
    ParticipantNotFound,

    #[error("user does not exist")]
    UserNotFound,

    /// Duplicate creation of `entity`
    #[error("{entity} already exists")]
    AlreadyExists { entity: &'static str },

    #[error("action is not allowed for this participant")]
    ForbiddenAction,

    #[error("status transition from {from} to {to} is not allowed")]
    IllegalTransition {
        from: ParticipantStatus,
        to: ParticipantStatus,
    },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Wire protocol error
    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    /// Database, I/O or downstream failure
    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error(transparent)]
    SharedError(#[from] SharedError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - not-found kinds - 404
    /// - `AlreadyExists`, `IllegalTransition` - 409
    /// - `ForbiddenAction` - 403
    /// - `Unauthorized` - 401
    /// - `ProtocolError`, validation - 400
    /// - `Transient` - 503
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConversationNotFound | Self::ParticipantNotFound | Self::UserNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::AlreadyExists { .. } | Self::IllegalTransition { .. } => StatusCode::CONFLICT,
            Self::ForbiddenAction => StatusCode::FORBIDDEN,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::ProtocolError { .. } => StatusCode::BAD_REQUEST,
            Self::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::SharedError(err) => match err {
                SharedError::ValidationError { .. } => StatusCode::BAD_REQUEST,
                SharedError::SerializationError { .. } | SharedError::UnknownValue { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Human-readable message sent to REST callers
    pub fn message(&self) -> String {
        match self {
            // Infrastructure detail stays in the logs
            Self::Transient { .. } => "service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}
