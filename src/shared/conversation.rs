//! Conversation Data Structure
//!
//! A conversation is either a two-person `Dialog`, whose membership is fixed
//! at creation, or a `Group` whose member set is managed by its admins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::error::SharedError;

pub const MAX_GROUP_NAME_LEN: usize = 100;
pub const MAX_GROUP_DESCRIPTION_LEN: usize = 500;

/// Kind of conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Dialog,
    Group,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dialog => "dialog",
            Self::Group => "group",
        }
    }
}

impl FromStr for ConversationKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dialog" => Ok(Self::Dialog),
            "group" => Ok(Self::Group),
            other => Err(SharedError::unknown("conversation kind", other)),
        }
    }
}

/// A conversation between two or more users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    /// Group name (always `None` for dialogs)
    pub name: Option<String>,
    /// Group description (always `None` for dialogs)
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new dialog
    pub fn new_dialog() -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Dialog,
            name: None,
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new group
    pub fn new_group(name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            name: Some(name),
            description,
            created_at: Utc::now(),
        }
    }

    pub fn is_dialog(&self) -> bool {
        self.kind == ConversationKind::Dialog
    }
}

/// Request to create a conversation
///
/// ```json
/// {"kind": "dialog", "peer_id": "..."}
/// {"kind": "group", "name": "Team", "member_ids": ["..."]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CreateConversationRequest {
    Dialog {
        peer_id: Uuid,
    },
    Group {
        name: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        member_ids: Vec<Uuid>,
    },
}

impl CreateConversationRequest {
    /// Check the request against the conversation rules for `creator`
    pub fn validate(&self, creator: Uuid) -> Result<(), SharedError> {
        match self {
            Self::Dialog { peer_id } => {
                if *peer_id == creator {
                    return Err(SharedError::validation(
                        "peer_id",
                        "a dialog needs two distinct users",
                    ));
                }
            }
            Self::Group {
                name, description, ..
            } => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(SharedError::validation("name", "group name cannot be empty"));
                }
                if name.chars().count() > MAX_GROUP_NAME_LEN {
                    return Err(SharedError::validation(
                        "name",
                        format!("group name exceeds {} characters", MAX_GROUP_NAME_LEN),
                    ));
                }
                if let Some(description) = description {
                    if description.chars().count() > MAX_GROUP_DESCRIPTION_LEN {
                        return Err(SharedError::validation(
                            "description",
                            format!("description exceeds {} characters", MAX_GROUP_DESCRIPTION_LEN),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Response for listing conversations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConversationsResponse {
    pub conversations: Vec<Conversation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialog_with_self_is_rejected() {
        let me = Uuid::new_v4();
        let request = CreateConversationRequest::Dialog { peer_id: me };
        assert!(request.validate(me).is_err());
        assert!(request.validate(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn group_name_rules() {
        let creator = Uuid::new_v4();
        let blank = CreateConversationRequest::Group {
            name: "   ".to_string(),
            description: None,
            member_ids: vec![],
        };
        assert!(blank.validate(creator).is_err());

        let long = CreateConversationRequest::Group {
            name: "x".repeat(MAX_GROUP_NAME_LEN + 1),
            description: None,
            member_ids: vec![],
        };
        assert!(long.validate(creator).is_err());
    }

    #[test]
    fn create_request_is_tagged_by_kind() {
        let peer = Uuid::new_v4();
        let json = serde_json::json!({"kind": "dialog", "peer_id": peer});
        let request: CreateConversationRequest = serde_json::from_value(json).unwrap();
        match request {
            CreateConversationRequest::Dialog { peer_id } => assert_eq!(peer_id, peer),
            _ => panic!("Expected Dialog"),
        }

        let json = serde_json::json!({"kind": "group", "name": "Team"});
        let request: CreateConversationRequest = serde_json::from_value(json).unwrap();
        match request {
            CreateConversationRequest::Group { member_ids, .. } => assert!(member_ids.is_empty()),
            _ => panic!("Expected Group"),
        }
    }
}
