//! Participant Service
//!
//! The domain-facing API over the membership store. It is the only layer
//! that knows who is calling, so it owns the permission rules:
//!
//! - a caller whose own row is missing or not `Joined` gets
//!   `ConversationNotFound`, never `ForbiddenAction`
//! - a member without admin rights gets `ForbiddenAction` for admin actions
//! - dialog membership is fixed, so invites and status changes on a dialog
//!   are `ForbiddenAction` for everyone
//!
//! Mutations run in one unit of work. The participant event is produced
//! after the commit; if that fails the row change stays durable and the
//! caller receives a `Transient` error.

use std::sync::Arc;
use uuid::Uuid;

use super::events::{EventSink, ParticipantEvent, ParticipantEventKind};
use super::status_matrix::{check_transition, ActorRole};
use super::store::MembershipStore;
use crate::backend::conversations::ConversationStore;
use crate::backend::db::Coordinator;
use crate::backend::error::BackendError;
use crate::shared::{Participant, ParticipantStatus};

pub struct ParticipantService<S> {
    store: Arc<S>,
    coordinator: Coordinator<S>,
    events: Arc<dyn EventSink>,
}

impl<S> Clone for ParticipantService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            coordinator: self.coordinator.clone(),
            events: Arc::clone(&self.events),
        }
    }
}

impl<S> ParticipantService<S>
where
    S: MembershipStore + ConversationStore,
{
    pub fn new(store: Arc<S>, events: Arc<dyn EventSink>) -> Self {
        Self {
            coordinator: Coordinator::new(Arc::clone(&store)),
            store,
            events,
        }
    }

    /// All participants of a conversation the caller is a member of
    pub async fn list(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<Participant>, BackendError> {
        require_member(&*self.store, None, conversation_id, caller_id).await?;
        self.store.list(None, conversation_id).await
    }

    /// One participant of a conversation the caller is a member of
    pub async fn get(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Participant, BackendError> {
        require_member(&*self.store, None, conversation_id, caller_id).await?;
        self.store.get(None, conversation_id, user_id, false).await
    }

    /// Add `user_id` to a group as a regular `Joined` member
    pub async fn invite(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Participant, BackendError> {
        let store = Arc::clone(&self.store);
        let participant = self
            .coordinator
            .run(move |tx| {
                Box::pin(async move {
                    let caller = require_member(&*store, Some(&mut *tx), conversation_id, caller_id)
                        .await?;
                    if !caller.is_admin {
                        return Err(BackendError::ForbiddenAction);
                    }
                    require_group(&*store, &mut *tx, conversation_id).await?;

                    let participant = Participant::joined(conversation_id, user_id);
                    store.create(Some(tx), &participant).await?;
                    Ok(participant)
                })
            })
            .await?;

        tracing::info!(
            "[Membership] {} invited {} into {}",
            caller_id,
            user_id,
            conversation_id
        );
        self.emit(ParticipantEvent::new(
            ParticipantEventKind::Added,
            conversation_id,
            user_id,
            caller_id,
        ))
        .await?;
        Ok(participant)
    }

    /// Move `target_id` to `new_status`
    ///
    /// Acting on your own row uses the self matrix and needs no admin
    /// rights. Acting on someone else's row needs admin rights and uses the
    /// admin matrix.
    pub async fn update_status(
        &self,
        caller_id: Uuid,
        conversation_id: Uuid,
        target_id: Uuid,
        new_status: ParticipantStatus,
    ) -> Result<Participant, BackendError> {
        let role = ActorRole::resolve(caller_id, target_id);
        let store = Arc::clone(&self.store);

        let updated = self
            .coordinator
            .run(move |tx| {
                Box::pin(async move {
                    match role {
                        ActorRole::SelfAction => {
                            require_own_row(&*store, &mut *tx, conversation_id, caller_id).await?;
                        }
                        ActorRole::AdminAction => {
                            let caller =
                                require_member(&*store, Some(&mut *tx), conversation_id, caller_id)
                                    .await?;
                            if !caller.is_admin {
                                return Err(BackendError::ForbiddenAction);
                            }
                        }
                    }
                    require_group(&*store, &mut *tx, conversation_id).await?;

                    store
                        .get_then_update(Some(tx), conversation_id, target_id, move |participant| {
                            check_transition(role, participant.status, new_status)?;
                            participant.status = new_status;
                            Ok(())
                        })
                        .await
                })
            })
            .await?;

        tracing::info!(
            "[Membership] {} moved {} to {} in {}",
            caller_id,
            target_id,
            new_status,
            conversation_id
        );
        self.emit(ParticipantEvent::new(
            event_kind(role, new_status),
            conversation_id,
            target_id,
            caller_id,
        ))
        .await?;
        Ok(updated)
    }

    async fn emit(&self, event: ParticipantEvent) -> Result<(), BackendError> {
        let (kind, conversation_id, user_id) = (event.kind, event.conversation_id, event.user_id);
        self.events.produce(event).await.map_err(|err| {
            tracing::warn!(
                "[Membership] {:?} event for {} in {} was lost after commit: {}",
                kind,
                user_id,
                conversation_id,
                err
            );
            BackendError::transient("participant event could not be delivered")
        })
    }
}

/// The caller's row, if they are a `Joined` member
///
/// Anything else is reported as `ConversationNotFound` so non-members cannot
/// learn which conversations exist.
pub(crate) async fn require_member<S>(
    store: &S,
    uow: Option<&mut S::Tx>,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Participant, BackendError>
where
    S: MembershipStore + ?Sized,
{
    match store.get(uow, conversation_id, user_id, false).await {
        Ok(participant) if participant.is_active() => Ok(participant),
        Ok(_) | Err(BackendError::ParticipantNotFound) => Err(BackendError::ConversationNotFound),
        Err(err) => Err(err),
    }
}

/// The caller's own row for a self action; a left member may still rejoin
async fn require_own_row<S>(
    store: &S,
    tx: &mut S::Tx,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<Participant, BackendError>
where
    S: MembershipStore + ?Sized,
{
    match store.get(Some(tx), conversation_id, user_id, false).await {
        Ok(participant) if participant.status != ParticipantStatus::Kicked => Ok(participant),
        Ok(_) | Err(BackendError::ParticipantNotFound) => Err(BackendError::ConversationNotFound),
        Err(err) => Err(err),
    }
}

async fn require_group<S>(
    store: &S,
    tx: &mut S::Tx,
    conversation_id: Uuid,
) -> Result<(), BackendError>
where
    S: ConversationStore + ?Sized,
{
    let conversation = store.get_conversation(Some(tx), conversation_id).await?;
    if conversation.is_dialog() {
        return Err(BackendError::ForbiddenAction);
    }
    Ok(())
}

fn event_kind(role: ActorRole, new_status: ParticipantStatus) -> ParticipantEventKind {
    match (role, new_status) {
        (_, ParticipantStatus::Kicked) => ParticipantEventKind::Kicked,
        (_, ParticipantStatus::Left) => ParticipantEventKind::Left,
        (ActorRole::SelfAction, ParticipantStatus::Joined) => ParticipantEventKind::Rejoined,
        (ActorRole::AdminAction, ParticipantStatus::Joined) => ParticipantEventKind::Reinstated,
    }
}
