//! Status Matrix
//!
//! Legal participant status transitions, as data. There are two tables: one
//! for changes a user makes to their own row, one for changes an admin makes
//! to someone else's row. Adding a status means editing a table, not code.
//!
//! ```text
//!            self             admin
//! Joined -> Left     Joined -> Kicked
//! Left   -> Joined   Kicked -> Joined
//! ```

use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::shared::ParticipantStatus;

use ParticipantStatus::{Joined, Kicked, Left};

/// A fixed table of permitted `(from, to)` transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMatrix {
    allowed: &'static [(ParticipantStatus, ParticipantStatus)],
}

/// Transitions a user may apply to their own row
pub const SELF_MATRIX: StatusMatrix = StatusMatrix {
    allowed: &[(Joined, Left), (Left, Joined)],
};

/// Transitions an admin may apply to another participant
pub const ADMIN_MATRIX: StatusMatrix = StatusMatrix {
    allowed: &[(Joined, Kicked), (Kicked, Joined)],
};

impl StatusMatrix {
    pub fn is_correct_transit(&self, from: ParticipantStatus, to: ParticipantStatus) -> bool {
        from != to && self.allowed.contains(&(from, to))
    }

    /// Same check on raw storage codes; unknown codes are never legal
    pub fn is_correct_transit_code(&self, from: i16, to: i16) -> bool {
        match (
            ParticipantStatus::from_code(from),
            ParticipantStatus::from_code(to),
        ) {
            (Ok(from), Ok(to)) => self.is_correct_transit(from, to),
            _ => false,
        }
    }
}

/// Who is performing a status change, relative to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    SelfAction,
    AdminAction,
}

impl ActorRole {
    pub fn resolve(caller_id: Uuid, target_id: Uuid) -> Self {
        if caller_id == target_id {
            Self::SelfAction
        } else {
            Self::AdminAction
        }
    }

    pub fn matrix(self) -> &'static StatusMatrix {
        match self {
            Self::SelfAction => &SELF_MATRIX,
            Self::AdminAction => &ADMIN_MATRIX,
        }
    }
}

/// Check a transition for `role`, producing the domain error on rejection
pub fn check_transition(
    role: ActorRole,
    from: ParticipantStatus,
    to: ParticipantStatus,
) -> Result<(), BackendError> {
    if role.matrix().is_correct_transit(from, to) {
        Ok(())
    } else {
        Err(BackendError::IllegalTransition { from, to })
    }
}
