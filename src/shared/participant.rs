//! Participant Data Structure
//!
//! A participant is the membership record of one user in one conversation.
//! Its identity is the `(conversation_id, user_id)` pair; rows are never
//! deleted, removal is modelled by the status moving to `Left` or `Kicked`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::SharedError;

/// Membership status of a participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Joined,
    Left,
    Kicked,
}

impl ParticipantStatus {
    /// All statuses, in storage-code order
    pub const ALL: [ParticipantStatus; 3] = [Self::Joined, Self::Left, Self::Kicked];

    /// Code persisted in the `participants.status` column
    pub fn as_code(self) -> i16 {
        match self {
            Self::Joined => 1,
            Self::Left => 2,
            Self::Kicked => 3,
        }
    }

    /// Decode a persisted status code, rejecting anything unknown
    pub fn from_code(code: i16) -> Result<Self, SharedError> {
        match code {
            1 => Ok(Self::Joined),
            2 => Ok(Self::Left),
            3 => Ok(Self::Kicked),
            other => Err(SharedError::unknown("participant status", other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Left => "left",
            Self::Kicked => "kicked",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" => Ok(Self::Joined),
            "left" => Ok(Self::Left),
            "kicked" => Ok(Self::Kicked),
            other => Err(SharedError::unknown("participant status", other)),
        }
    }
}

/// Membership record of one user in one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub status: ParticipantStatus,
    pub is_admin: bool,
}

impl Participant {
    /// A regular member that has just joined
    pub fn joined(conversation_id: Uuid, user_id: Uuid) -> Self {
        Self {
            conversation_id,
            user_id,
            status: ParticipantStatus::Joined,
            is_admin: false,
        }
    }

    /// A joined member holding admin rights (conversation creators)
    pub fn admin(conversation_id: Uuid, user_id: Uuid) -> Self {
        Self {
            is_admin: true,
            ..Self::joined(conversation_id, user_id)
        }
    }

    /// Whether the participant currently counts as a member
    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Joined
    }
}

/// Request body for inviting a user into a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteParticipantRequest {
    pub user_id: Uuid,
}

/// Request body for changing a participant's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateParticipantStatusRequest {
    pub status: ParticipantStatus,
}

/// Response for listing participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParticipantsResponse {
    pub participants: Vec<Participant>,
}
