//! Database Module
//!
//! Postgres-backed stores plus an in-memory store with the same locking
//! semantics, both driven through explicit units of work.
//!
//! # Module Structure
//!
//! ```text
//! db/
//! ├── mod.rs           - PgStore and its Transactor impl
//! ├── transaction.rs   - Transactor, Coordinator and executor resolution
//! ├── participants.rs  - MembershipStore for Postgres
//! ├── conversations.rs - ConversationStore for Postgres
//! └── memory.rs        - In-memory store with per-row locks
//! ```

pub mod conversations;
pub mod memory;
pub mod participants;
pub mod transaction;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::backend::error::BackendError;

pub use memory::MemoryStore;
pub use transaction::{resolve, Coordinator, DbHandle, PgTx, Transactor};

/// Postgres store shared by the membership and conversation layers
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Transactor for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx, BackendError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), BackendError> {
        Ok(tx.commit().await?)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BackendError> {
        Ok(tx.rollback().await?)
    }
}
