/**
 * Message Data Structure
 *
 * This module defines the chat `Message` that travels over the bus and the
 * duplex connection. Messages are immutable once created; the only field
 * filled in later is `delivered_at`, which each session stamps on its own
 * copy right before writing it to the client.
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SharedError;

/// Content type assumed when a client does not send one
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Largest accepted message body, in bytes
pub const MAX_CONTENT_BYTES: usize = 4096;

/// Represents a single chat or service message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub conversation_id: Uuid,
    pub content: String,
    pub content_type: String,
    /// Set for membership notices (join/leave/kick)
    pub is_service: bool,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Create a chat message sent by a user
    pub fn chat(
        sender_id: Uuid,
        conversation_id: Uuid,
        content: String,
        content_type: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            conversation_id,
            content,
            content_type,
            is_service: false,
            sent_at: Utc::now(),
            delivered_at: None,
        }
    }

    /// Create a service message describing a membership change
    pub fn service(sender_id: Uuid, conversation_id: Uuid, content: String) -> Self {
        Self {
            is_service: true,
            ..Self::chat(sender_id, conversation_id, content, DEFAULT_CONTENT_TYPE.to_string())
        }
    }

    /// Copy of this message marked as delivered now
    pub fn delivered(mut self) -> Self {
        self.delivered_at = Some(Utc::now());
        self
    }
}

/// Validate user-supplied message content
pub fn validate_content(content: &str, content_type: &str) -> Result<(), SharedError> {
    if content.trim().is_empty() {
        return Err(SharedError::validation("content", "message content cannot be empty"));
    }
    if content.len() > MAX_CONTENT_BYTES {
        return Err(SharedError::validation(
            "content",
            format!("message content exceeds {} bytes", MAX_CONTENT_BYTES),
        ));
    }
    if content_type.is_empty() || !content_type.contains('/') {
        return Err(SharedError::validation(
            "content_type",
            "content type must look like a MIME type",
        ));
    }
    Ok(())
}
