//! In-memory store
//!
//! Implements both store traits without a database. Row locks are real
//! async mutexes held by the transaction until it ends, so concurrent
//! read-modify-write cycles serialize exactly as they do on `FOR UPDATE`.
//! Writes made inside a transaction are staged and only become visible to
//! others on commit. Dropping a transaction discards them.
//!
//! Used by the test suites and by local runs without Postgres.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use uuid::Uuid;

use super::Transactor;
use crate::backend::conversations::ConversationStore;
use crate::backend::error::BackendError;
use crate::backend::membership::MembershipStore;
use crate::shared::{Conversation, Participant, ParticipantStatus};

type RowKey = (Uuid, Uuid);

#[derive(Default)]
struct Tables {
    participants: HashMap<RowKey, Participant>,
    conversations: HashMap<Uuid, Conversation>,
    users: HashSet<Uuid>,
}

/// Open transaction on a [`MemoryStore`]
#[derive(Default)]
pub struct MemoryTx {
    participants: HashMap<RowKey, Participant>,
    conversations: HashMap<Uuid, Conversation>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
}

impl MemoryTx {
    /// Whether this transaction currently holds the lock on a row
    pub fn holds_lock(&self, conversation_id: Uuid, user_id: Uuid) -> bool {
        self.guards.contains_key(&(conversation_id, user_id))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowLock<()>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a user id known so participant rows may reference it
    pub fn register_user(&self, user_id: Uuid) {
        self.tables().users.insert(user_id);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn lock_row(&self, tx: &mut MemoryTx, key: RowKey) {
        if tx.guards.contains_key(&key) {
            return;
        }
        let lock = {
            let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(key).or_default())
        };
        let guard = lock.lock_owned().await;
        tx.guards.insert(key, guard);
    }

    /// Release a finished transaction's row locks and forget idle ones
    fn release(&self, guards: HashMap<RowKey, OwnedMutexGuard<()>>) {
        let keys: Vec<RowKey> = guards.keys().copied().collect();
        drop(guards);

        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            // A waiter still holds a clone; its entry must stay shared
            if locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(&key);
            }
        }
    }

    /// Commit a single-statement transaction, or roll it back on error
    async fn finish(
        &self,
        tx: MemoryTx,
        staged: Result<(), BackendError>,
    ) -> Result<(), BackendError> {
        match staged {
            Ok(()) => self.commit(tx).await,
            Err(e) => {
                self.rollback(tx).await?;
                Err(e)
            }
        }
    }

    fn read_participant(
        &self,
        tx: Option<&MemoryTx>,
        key: RowKey,
    ) -> Result<Participant, BackendError> {
        if let Some(staged) = tx.and_then(|tx| tx.participants.get(&key)) {
            return Ok(staged.clone());
        }
        self.tables()
            .participants
            .get(&key)
            .cloned()
            .ok_or(BackendError::ParticipantNotFound)
    }

    fn read_conversation(
        &self,
        tx: Option<&MemoryTx>,
        conversation_id: Uuid,
    ) -> Result<Conversation, BackendError> {
        if let Some(staged) = tx.and_then(|tx| tx.conversations.get(&conversation_id)) {
            return Ok(staged.clone());
        }
        self.tables()
            .conversations
            .get(&conversation_id)
            .cloned()
            .ok_or(BackendError::ConversationNotFound)
    }

    /// Committed rows overlaid with the transaction's staged writes
    fn visible_participants(&self, tx: Option<&MemoryTx>) -> HashMap<RowKey, Participant> {
        let mut rows = self.tables().participants.clone();
        if let Some(tx) = tx {
            rows.extend(tx.participants.iter().map(|(k, p)| (*k, p.clone())));
        }
        rows
    }

    async fn stage_create(
        &self,
        tx: &mut MemoryTx,
        participant: &Participant,
    ) -> Result<(), BackendError> {
        let key = (participant.conversation_id, participant.user_id);
        // Concurrent inserts of one key wait on each other like a unique index
        self.lock_row(tx, key).await;

        if self.read_participant(Some(&*tx), key).is_ok() {
            return Err(BackendError::AlreadyExists {
                entity: "participant",
            });
        }
        self.read_conversation(Some(&*tx), participant.conversation_id)?;
        if !self.tables().users.contains(&participant.user_id) {
            return Err(BackendError::UserNotFound);
        }

        tx.participants.insert(key, participant.clone());
        Ok(())
    }

    async fn stage_update(
        &self,
        tx: &mut MemoryTx,
        participant: &Participant,
    ) -> Result<(), BackendError> {
        let key = (participant.conversation_id, participant.user_id);
        self.lock_row(tx, key).await;
        self.read_participant(Some(&*tx), key)?;
        tx.participants.insert(key, participant.clone());
        Ok(())
    }

    fn stage_conversation(
        &self,
        tx: &mut MemoryTx,
        conversation: &Conversation,
    ) -> Result<(), BackendError> {
        if self.read_conversation(Some(&*tx), conversation.id).is_ok() {
            return Err(BackendError::AlreadyExists {
                entity: "conversation",
            });
        }
        tx.conversations.insert(conversation.id, conversation.clone());
        Ok(())
    }
}

#[async_trait]
impl Transactor for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, BackendError> {
        Ok(MemoryTx::default())
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), BackendError> {
        let MemoryTx {
            participants,
            conversations,
            guards,
        } = tx;
        {
            let mut tables = self.tables();
            tables.conversations.extend(conversations);
            tables.participants.extend(participants);
        }
        // Locks are released only after the writes are visible
        self.release(guards);
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BackendError> {
        self.release(tx.guards);
        Ok(())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn list(
        &self,
        uow: Option<&mut MemoryTx>,
        conversation_id: Uuid,
    ) -> Result<Vec<Participant>, BackendError> {
        let mut participants: Vec<Participant> = self
            .visible_participants(uow.as_deref())
            .into_values()
            .filter(|p| p.conversation_id == conversation_id)
            .collect();
        participants.sort_by_key(|p| p.user_id);
        Ok(participants)
    }

    async fn get(
        &self,
        uow: Option<&mut MemoryTx>,
        conversation_id: Uuid,
        user_id: Uuid,
        with_lock: bool,
    ) -> Result<Participant, BackendError> {
        let key = (conversation_id, user_id);
        match uow {
            Some(tx) => {
                if with_lock {
                    self.lock_row(tx, key).await;
                }
                self.read_participant(Some(&*tx), key)
            }
            None if with_lock => Err(BackendError::transient(
                "row lock requested outside a unit of work",
            )),
            None => self.read_participant(None, key),
        }
    }

    async fn create(
        &self,
        uow: Option<&mut MemoryTx>,
        participant: &Participant,
    ) -> Result<(), BackendError> {
        match uow {
            Some(tx) => self.stage_create(tx, participant).await,
            None => {
                let mut tx = self.begin().await?;
                let staged = self.stage_create(&mut tx, participant).await;
                self.finish(tx, staged).await
            }
        }
    }

    async fn update(
        &self,
        uow: Option<&mut MemoryTx>,
        participant: &Participant,
    ) -> Result<(), BackendError> {
        match uow {
            Some(tx) => self.stage_update(tx, participant).await,
            None => {
                let mut tx = self.begin().await?;
                let staged = self.stage_update(&mut tx, participant).await;
                self.finish(tx, staged).await
            }
        }
    }

    async fn conversations_for_user(
        &self,
        uow: Option<&mut MemoryTx>,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, BackendError> {
        let mut ids: Vec<Uuid> = self
            .visible_participants(uow.as_deref())
            .into_values()
            .filter(|p| p.user_id == user_id && p.status == ParticipantStatus::Joined)
            .map(|p| p.conversation_id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(
        &self,
        uow: Option<&mut MemoryTx>,
        conversation: &Conversation,
    ) -> Result<(), BackendError> {
        match uow {
            Some(tx) => self.stage_conversation(tx, conversation),
            None => {
                let mut tx = self.begin().await?;
                let staged = self.stage_conversation(&mut tx, conversation);
                self.finish(tx, staged).await
            }
        }
    }

    async fn get_conversation(
        &self,
        uow: Option<&mut MemoryTx>,
        conversation_id: Uuid,
    ) -> Result<Conversation, BackendError> {
        self.read_conversation(uow.as_deref(), conversation_id)
    }

    async fn list_conversations_for_user(
        &self,
        mut uow: Option<&mut MemoryTx>,
        user_id: Uuid,
    ) -> Result<Vec<Conversation>, BackendError> {
        let ids = self
            .conversations_for_user(uow.as_deref_mut(), user_id)
            .await?;
        let mut conversations = ids
            .into_iter()
            .map(|id| self.read_conversation(uow.as_deref(), id))
            .collect::<Result<Vec<_>, _>>()?;
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn seeded() -> (MemoryStore, Conversation, Uuid) {
        let store = MemoryStore::new();
        let conversation = Conversation::new_group("Team".to_string(), None);
        let user = Uuid::new_v4();
        store.register_user(user);
        store
            .tables()
            .conversations
            .insert(conversation.id, conversation.clone());
        (store, conversation, user)
    }

    #[tokio::test]
    async fn staged_writes_are_invisible_until_commit() {
        let (store, conversation, user) = seeded();
        let participant = Participant::joined(conversation.id, user);

        let mut tx = store.begin().await.unwrap();
        store.create(Some(&mut tx), &participant).await.unwrap();

        assert!(store.get(Some(&mut tx), conversation.id, user, false).await.is_ok());
        assert!(matches!(
            store.get(None, conversation.id, user, false).await,
            Err(BackendError::ParticipantNotFound)
        ));

        store.commit(tx).await.unwrap();
        assert!(store.get(None, conversation.id, user, false).await.is_ok());
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let (store, conversation, user) = seeded();
        let mut tx = store.begin().await.unwrap();
        store
            .create(Some(&mut tx), &Participant::joined(conversation.id, user))
            .await
            .unwrap();
        store.rollback(tx).await.unwrap();

        assert!(store.list(None, conversation.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let (store, conversation, user) = seeded();
        let participant = Participant::joined(conversation.id, user);
        store.create(None, &participant).await.unwrap();

        let err = store.create(None, &participant).await.unwrap_err();
        assert!(matches!(err, BackendError::AlreadyExists { entity: "participant" }));
    }

    #[tokio::test]
    async fn missing_references_are_classified() {
        let (store, conversation, _) = seeded();

        let err = store
            .create(None, &Participant::joined(conversation.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UserNotFound));

        let user = Uuid::new_v4();
        store.register_user(user);
        let err = store
            .create(None, &Participant::joined(Uuid::new_v4(), user))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ConversationNotFound));
    }

    #[tokio::test]
    async fn lock_outside_unit_of_work_is_rejected() {
        let (store, conversation, user) = seeded();
        store
            .create(None, &Participant::joined(conversation.id, user))
            .await
            .unwrap();

        let err = store.get(None, conversation.id, user, true).await.unwrap_err();
        assert!(matches!(err, BackendError::Transient { .. }));
    }

    #[tokio::test]
    async fn locked_row_blocks_second_locker_until_commit() {
        let (store, conversation, user) = seeded();
        let store = Arc::new(store);
        store
            .create(None, &Participant::joined(conversation.id, user))
            .await
            .unwrap();

        let mut first = store.begin().await.unwrap();
        store.get(Some(&mut first), conversation.id, user, true).await.unwrap();
        assert!(first.holds_lock(conversation.id, user));

        let contender = {
            let store = Arc::clone(&store);
            let conversation_id = conversation.id;
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                let seen = store.get(Some(&mut tx), conversation_id, user, true).await.unwrap();
                store.commit(tx).await.unwrap();
                seen
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let mut left = Participant::joined(conversation.id, user);
        left.status = ParticipantStatus::Left;
        store.update(Some(&mut first), &left).await.unwrap();
        store.commit(first).await.unwrap();

        let seen = contender.await.unwrap();
        assert_eq!(seen.status, ParticipantStatus::Left);
        assert_eq!(store.row_lock_entries(), 0);
    }

    impl MemoryStore {
        fn row_lock_entries(&self) -> usize {
            self.row_locks.lock().unwrap().len()
        }
    }

    #[tokio::test]
    async fn row_locks_are_forgotten_when_transactions_end() {
        let (store, conversation, user) = seeded();
        let other = Uuid::new_v4();
        store.register_user(other);

        for round in 0..3 {
            let mut tx = store.begin().await.unwrap();
            store
                .create(Some(&mut tx), &Participant::joined(conversation.id, Uuid::new_v4()))
                .await
                .unwrap_err();
            if round % 2 == 0 {
                store.commit(tx).await.unwrap();
            } else {
                store.rollback(tx).await.unwrap();
            }
        }
        assert_eq!(store.row_lock_entries(), 0);

        store
            .create(None, &Participant::joined(conversation.id, user))
            .await
            .unwrap();
        store
            .create(None, &Participant::joined(conversation.id, user))
            .await
            .unwrap_err();
        let mut tx = store.begin().await.unwrap();
        store.get(Some(&mut tx), conversation.id, other, true).await.unwrap_err();
        assert_eq!(store.row_lock_entries(), 1);
        store.rollback(tx).await.unwrap();

        assert_eq!(store.row_lock_entries(), 0);
    }

    #[tokio::test]
    async fn waiting_locker_keeps_the_shared_lock() {
        let (store, conversation, user) = seeded();
        let store = Arc::new(store);
        store
            .create(None, &Participant::joined(conversation.id, user))
            .await
            .unwrap();

        let mut holder = store.begin().await.unwrap();
        store.get(Some(&mut holder), conversation.id, user, true).await.unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            let conversation_id = conversation.id;
            tokio::spawn(async move {
                let mut tx = store.begin().await.unwrap();
                store.get(Some(&mut tx), conversation_id, user, true).await.unwrap();
                tx
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.commit(holder).await.unwrap();
        assert_eq!(store.row_lock_entries(), 1);

        let tx = waiter.await.unwrap();
        assert!(tx.holds_lock(conversation.id, user));
        store.commit(tx).await.unwrap();
        assert_eq!(store.row_lock_entries(), 0);
    }
}
