//! Shared Module
//!
//! Domain and wire types used by every backend layer: participants,
//! conversations, messages and the real-time envelope that carries them
//! over the bus. Nothing in here performs I/O.

/// Shared error types
pub mod error;

/// Participant (membership) records
pub mod participant;

/// Conversations
pub mod conversation;

/// Chat and service messages
pub mod message;

/// Real-time bus envelope
pub mod event;

pub use conversation::{Conversation, ConversationKind, CreateConversationRequest};
pub use error::SharedError;
pub use event::{BusAction, RealtimeEvent};
pub use message::Message;
pub use participant::{Participant, ParticipantStatus};
