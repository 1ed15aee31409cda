//! Conversation persistence

use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::db::Transactor;
use crate::backend::error::BackendError;
use crate::shared::Conversation;

#[async_trait]
pub trait ConversationStore: Transactor {
    async fn create_conversation(
        &self,
        uow: Option<&mut Self::Tx>,
        conversation: &Conversation,
    ) -> Result<(), BackendError>;

    /// `ConversationNotFound` if absent
    async fn get_conversation(
        &self,
        uow: Option<&mut Self::Tx>,
        conversation_id: Uuid,
    ) -> Result<Conversation, BackendError>;

    /// Conversations the user is currently joined to, newest first
    async fn list_conversations_for_user(
        &self,
        uow: Option<&mut Self::Tx>,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, BackendError>;
}
