//! Participant rows in Postgres
//!
//! Statuses are stored as `SMALLINT` codes. A code outside the known set is
//! surfaced as an error instead of being coerced.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{resolve, PgStore, PgTx};
use crate::backend::error::{classify_sqlx_error, BackendError};
use crate::backend::membership::MembershipStore;
use crate::shared::{Participant, ParticipantStatus};

const SELECT_PARTICIPANT: &str = r#"
    SELECT conversation_id, user_id, status, is_admin
    FROM participants
    WHERE conversation_id = $1 AND user_id = $2
"#;

fn participant_from_row(row: &PgRow) -> Result<Participant, BackendError> {
    let code: i16 = row.try_get("status")?;
    Ok(Participant {
        conversation_id: row.try_get("conversation_id")?,
        user_id: row.try_get("user_id")?,
        status: ParticipantStatus::from_code(code)?,
        is_admin: row.try_get("is_admin")?,
    })
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn list(
        &self,
        uow: Option<&mut PgTx>,
        conversation_id: Uuid,
    ) -> Result<Vec<Participant>, BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        let rows = sqlx::query(
            r#"
            SELECT conversation_id, user_id, status, is_admin
            FROM participants
            WHERE conversation_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(handle.conn())
        .await?;

        rows.iter().map(participant_from_row).collect()
    }

    async fn get(
        &self,
        uow: Option<&mut PgTx>,
        conversation_id: Uuid,
        user_id: Uuid,
        with_lock: bool,
    ) -> Result<Participant, BackendError> {
        if with_lock && uow.is_none() {
            return Err(BackendError::transient(
                "row lock requested outside a unit of work",
            ));
        }
        let mut handle = resolve(self.pool(), uow).await?;

        let sql = if with_lock {
            format!("{} FOR UPDATE", SELECT_PARTICIPANT)
        } else {
            SELECT_PARTICIPANT.to_string()
        };

        let row = sqlx::query(&sql)
            .bind(conversation_id)
            .bind(user_id)
            .fetch_optional(handle.conn())
            .await?;

        match row {
            Some(row) => participant_from_row(&row),
            None => Err(BackendError::ParticipantNotFound),
        }
    }

    async fn create(
        &self,
        uow: Option<&mut PgTx>,
        participant: &Participant,
    ) -> Result<(), BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        sqlx::query(
            r#"
            INSERT INTO participants (conversation_id, user_id, status, is_admin)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(participant.conversation_id)
        .bind(participant.user_id)
        .bind(participant.status.as_code())
        .bind(participant.is_admin)
        .execute(handle.conn())
        .await
        .map_err(|e| classify_sqlx_error(e, "participant"))?;

        Ok(())
    }

    async fn update(
        &self,
        uow: Option<&mut PgTx>,
        participant: &Participant,
    ) -> Result<(), BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        let result = sqlx::query(
            r#"
            UPDATE participants
            SET status = $3, is_admin = $4
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(participant.conversation_id)
        .bind(participant.user_id)
        .bind(participant.status.as_code())
        .bind(participant.is_admin)
        .execute(handle.conn())
        .await
        .map_err(|e| classify_sqlx_error(e, "participant"))?;

        if result.rows_affected() == 0 {
            return Err(BackendError::ParticipantNotFound);
        }
        Ok(())
    }

    async fn conversations_for_user(
        &self,
        uow: Option<&mut PgTx>,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError> {
        let mut handle = resolve(self.pool(), uow).await?;

        let rows = sqlx::query(
            r#"
            SELECT conversation_id
            FROM participants
            WHERE user_id = $1 AND status = $2
            "#,
        )
        .bind(user_id)
        .bind(ParticipantStatus::Joined.as_code())
        .fetch_all(handle.conn())
        .await?;

        rows.iter()
            .map(|row| row.try_get("conversation_id").map_err(BackendError::from))
            .collect()
    }
}
