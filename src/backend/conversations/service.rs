//! Conversation Service
//!
//! The creator of a conversation becomes its `Joined` admin. A dialog peer
//! joins as a regular member; so do the initial members of a group. The
//! conversation row and all participant rows are written in one unit of
//! work, so a missing member aborts the whole creation.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::store::ConversationStore;
use crate::backend::db::Coordinator;
use crate::backend::error::BackendError;
use crate::backend::membership::service::require_member;
use crate::backend::membership::MembershipStore;
use crate::shared::{Conversation, CreateConversationRequest, Participant};

pub struct ConversationService<S> {
    store: Arc<S>,
    coordinator: Coordinator<S>,
}

impl<S> Clone for ConversationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<S> ConversationService<S>
where
    S: MembershipStore + ConversationStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            coordinator: Coordinator::new(Arc::clone(&store)),
            store,
        }
    }

    pub async fn create(
        &self,
        creator_id: Uuid,
        request: CreateConversationRequest,
    ) -> Result<Conversation, BackendError> {
        request.validate(creator_id)?;

        let (conversation, members) = match request {
            CreateConversationRequest::Dialog { peer_id } => {
                (Conversation::new_dialog(), vec![peer_id])
            }
            CreateConversationRequest::Group {
                name,
                description,
                member_ids,
            } => {
                let mut seen = HashSet::from([creator_id]);
                let members = member_ids
                    .into_iter()
                    .filter(|id| seen.insert(*id))
                    .collect::<Vec<_>>();
                (
                    Conversation::new_group(name.trim().to_string(), description),
                    members,
                )
            }
        };

        let mut participants = vec![Participant::admin(conversation.id, creator_id)];
        participants.extend(
            members
                .into_iter()
                .map(|user_id| Participant::joined(conversation.id, user_id)),
        );

        let store = Arc::clone(&self.store);
        let record = conversation.clone();
        self.coordinator
            .run(move |tx| {
                Box::pin(async move {
                    store.create_conversation(Some(&mut *tx), &record).await?;
                    for participant in &participants {
                        store.create(Some(&mut *tx), participant).await?;
                    }
                    Ok(())
                })
            })
            .await?;

        tracing::info!(
            "[Conversations] {} created {} {}",
            creator_id,
            conversation.kind.as_str(),
            conversation.id
        );
        Ok(conversation)
    }

    /// Conversations the caller is currently joined to
    pub async fn list(&self, caller_id: Uuid) -> Result<Vec<Conversation>, BackendError> {
        self.store.list_conversations_for_user(None, caller_id).await
    }

    pub async fn get(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Conversation, BackendError> {
        require_member(&*self.store, None, conversation_id, caller_id).await?;
        self.store.get_conversation(None, conversation_id).await
    }
}
