//! Participant events
//!
//! Emitted by the participant service after a membership change has been
//! committed. The sink is a boundary: the service only needs `produce` to
//! succeed or fail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::realtime::MessageBus;
use crate::shared::{BusAction, Message, RealtimeEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantEventKind {
    /// Invited by an admin
    Added,
    Left,
    Rejoined,
    Kicked,
    /// Let back in by an admin after a kick
    Reinstated,
}

impl ParticipantEventKind {
    pub fn bus_action(self) -> BusAction {
        match self {
            Self::Added | Self::Rejoined | Self::Reinstated => BusAction::Join,
            Self::Left => BusAction::Leave,
            Self::Kicked => BusAction::Kick,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEvent {
    pub kind: ParticipantEventKind,
    pub conversation_id: Uuid,
    /// Participant whose row changed
    pub user_id: Uuid,
    /// User who performed the change
    pub actor_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl ParticipantEvent {
    pub fn new(
        kind: ParticipantEventKind,
        conversation_id: Uuid,
        user_id: Uuid,
        actor_id: Uuid,
    ) -> Self {
        Self {
            kind,
            conversation_id,
            user_id,
            actor_id,
            occurred_at: Utc::now(),
        }
    }

    /// Human-readable notice carried by the service message
    pub fn notice(&self) -> String {
        match self.kind {
            ParticipantEventKind::Added => format!("{} was added by {}", self.user_id, self.actor_id),
            ParticipantEventKind::Left => format!("{} left", self.user_id),
            ParticipantEventKind::Rejoined => format!("{} rejoined", self.user_id),
            ParticipantEventKind::Kicked => {
                format!("{} was removed by {}", self.user_id, self.actor_id)
            }
            ParticipantEventKind::Reinstated => {
                format!("{} was reinstated by {}", self.user_id, self.actor_id)
            }
        }
    }
}

/// Downstream consumer of participant events
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn produce(&self, event: ParticipantEvent) -> Result<(), BackendError>;
}

/// Publishes every event as a service message
///
/// The message goes to the conversation topic and then to the affected
/// user's own topic (keyed by their user id), where their sessions learn
/// about memberships they are not yet subscribed to.
#[derive(Clone)]
pub struct BusEventSink {
    bus: MessageBus,
}

impl BusEventSink {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl EventSink for BusEventSink {
    async fn produce(&self, event: ParticipantEvent) -> Result<(), BackendError> {
        let message = Message::service(event.actor_id, event.conversation_id, event.notice());
        let notice = RealtimeEvent::service(event.kind.bus_action(), message, event.user_id);
        let delivered = self.bus.publish(event.conversation_id, notice.clone())?
            + self.bus.publish(event.user_id, notice)?;

        tracing::debug!(
            "[Membership] {:?} for {} in {} delivered to {} session(s)",
            event.kind,
            event.user_id,
            event.conversation_id,
            delivered
        );
        Ok(())
    }
}
