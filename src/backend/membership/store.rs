//! Membership Store
//!
//! Persistence of participant rows with the row-locking needed to make
//! status changes race-free. `get_then_update` is the only writer path for
//! status transitions: it locks the row, lets the caller mutate it and
//! persists the result in the same transaction, so two concurrent updates of
//! one participant serialize on the row lock and the loser sees the
//! winner's state.

use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::db::Transactor;
use crate::backend::error::BackendError;
use crate::shared::Participant;

#[async_trait]
pub trait MembershipStore: Transactor {
    /// All participant rows of a conversation, any status
    async fn list(
        &self,
        uow: Option<&mut Self::Tx>,
        conversation_id: Uuid,
    ) -> Result<Vec<Participant>, BackendError>;

    /// One participant row; `ParticipantNotFound` if absent
    ///
    /// With `with_lock` the row stays exclusively locked until the enclosing
    /// unit of work ends. Locking without a unit of work is rejected.
    async fn get(
        &self,
        uow: Option<&mut Self::Tx>,
        conversation_id: Uuid,
        user_id: Uuid,
        with_lock: bool,
    ) -> Result<Participant, BackendError>;

    /// Insert a new row
    ///
    /// Fails with `AlreadyExists` on a primary key conflict and `UserNotFound`
    /// when the user does not exist.
    async fn create(
        &self,
        uow: Option<&mut Self::Tx>,
        participant: &Participant,
    ) -> Result<(), BackendError>;

    /// Overwrite status and admin flag of an existing row
    async fn update(
        &self,
        uow: Option<&mut Self::Tx>,
        participant: &Participant,
    ) -> Result<(), BackendError>;

    /// Conversations in which the user is currently `Joined`
    async fn conversations_for_user(
        &self,
        uow: Option<&mut Self::Tx>,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError>;

    /// Lock a row, apply `mutate` and persist it atomically
    ///
    /// Runs inside `uow` when given, otherwise in a transaction of its own.
    /// When `mutate` fails nothing is written.
    async fn get_then_update<F>(
        &self,
        uow: Option<&mut Self::Tx>,
        conversation_id: Uuid,
        user_id: Uuid,
        mutate: F,
    ) -> Result<Participant, BackendError>
    where
        F: FnOnce(&mut Participant) -> Result<(), BackendError> + Send,
    {
        match uow {
            Some(tx) => lock_and_apply(self, tx, conversation_id, user_id, mutate).await,
            None => {
                let mut tx = self.begin().await?;
                match lock_and_apply(self, &mut tx, conversation_id, user_id, mutate).await {
                    Ok(participant) => {
                        self.commit(tx).await?;
                        Ok(participant)
                    }
                    Err(err) => {
                        if let Err(rollback_err) = self.rollback(tx).await {
                            tracing::warn!("[Membership] rollback failed: {}", rollback_err);
                        }
                        Err(err)
                    }
                }
            }
        }
    }
}

async fn lock_and_apply<S, F>(
    store: &S,
    tx: &mut S::Tx,
    conversation_id: Uuid,
    user_id: Uuid,
    mutate: F,
) -> Result<Participant, BackendError>
where
    S: MembershipStore + ?Sized,
    F: FnOnce(&mut Participant) -> Result<(), BackendError> + Send,
{
    let mut participant = store.get(Some(&mut *tx), conversation_id, user_id, true).await?;
    mutate(&mut participant)?;
    store.update(Some(tx), &participant).await?;
    Ok(participant)
}
