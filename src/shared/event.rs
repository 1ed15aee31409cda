/**
 * Real-time Event System
 *
 * This module defines the envelope that travels on the message bus and is
 * written to each connected client. The envelope pairs a `Message` with the
 * action that produced it, so receivers can tell a plain chat send from a
 * membership notice. Membership notices also name the participant whose
 * status changed in `target_user_id`.
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

/// What produced a real-time event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusAction {
    /// A user sent a chat message
    Send,
    /// A user joined (was invited, rejoined or was reinstated)
    Join,
    /// A user left voluntarily
    Leave,
    /// A user was removed by an admin
    Kick,
}

impl BusAction {
    /// Whether the action is a membership notice rather than a chat send
    pub fn is_service(self) -> bool {
        !matches!(self, BusAction::Send)
    }
}

/// Real-time event fanned out to every subscriber of a conversation topic
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RealtimeEvent {
    pub action: BusAction,
    pub message: Message,
    /// Participant a membership notice is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<Uuid>,
    /// Session that published the event; never written to the wire
    #[serde(skip)]
    pub origin_session: Option<Uuid>,
}

impl RealtimeEvent {
    /// Event for a chat message published by `origin_session`
    pub fn send(message: Message, origin_session: Uuid) -> Self {
        Self {
            action: BusAction::Send,
            message,
            target_user_id: None,
            origin_session: Some(origin_session),
        }
    }

    /// Event for a membership notice about `target_user_id`; it has no
    /// originating session
    pub fn service(action: BusAction, message: Message, target_user_id: Uuid) -> Self {
        Self {
            action,
            message,
            target_user_id: Some(target_user_id),
            origin_session: None,
        }
    }

    /// Whether this is a membership notice about `user_id`
    pub fn concerns(&self, user_id: Uuid) -> bool {
        self.action.is_service() && self.target_user_id == Some(user_id)
    }

    /// Topic the event belongs to
    pub fn topic(&self) -> Uuid {
        self.message.conversation_id
    }
}
