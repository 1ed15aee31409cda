//! Conversation rows in Postgres

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{resolve, PgStore, PgTx};
use crate::backend::conversations::ConversationStore;
use crate::backend::error::{classify_sqlx_error, BackendError};
use crate::shared::{Conversation, ParticipantStatus};

fn conversation_from_row(row: &PgRow) -> Result<Conversation, BackendError> {
    let kind: String = row.try_get("kind")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        kind: kind.parse()?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn create_conversation(
        &self,
        uow: Option<&mut PgTx>,
        conversation: &Conversation,
    ) -> Result<(), BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, kind, name, description, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.kind.as_str())
        .bind(conversation.name.as_deref())
        .bind(conversation.description.as_deref())
        .bind(conversation.created_at)
        .execute(handle.conn())
        .await
        .map_err(|e| classify_sqlx_error(e, "conversation"))?;

        Ok(())
    }

    async fn get_conversation(
        &self,
        uow: Option<&mut PgTx>,
        conversation_id: Uuid,
    ) -> Result<Conversation, BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        let row = sqlx::query(
            r#"
            SELECT id, kind, name, description, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(handle.conn())
        .await?;

        match row {
            Some(row) => conversation_from_row(&row),
            None => Err(BackendError::ConversationNotFound),
        }
    }

    async fn list_conversations_for_user(
        &self,
        uow: Option<&mut PgTx>,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.kind, c.name, c.description, c.created_at
            FROM conversations c
            JOIN participants p ON p.conversation_id = c.id
            WHERE p.user_id = $1 AND p.status = $2
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(ParticipantStatus::Joined.as_code())
        .fetch_all(handle.conn())
        .await?;

        rows.iter().map(conversation_from_row).collect()
    }
}
