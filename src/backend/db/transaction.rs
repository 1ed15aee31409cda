//! Units of Work
//!
//! A unit of work is one database transaction that several store calls can
//! share. Every store method takes an explicit `uow: Option<&mut Tx>`: with
//! `Some` the call runs on that transaction, with `None` it runs standalone
//! and auto-commits. Which client executes a query is therefore decided by
//! the argument alone, never by ambient state.
//!
//! Only leaf orchestrators (the participant and conversation services) open
//! units of work through [`Coordinator::run`]. Stores never call `run`
//! themselves and units of work do not nest.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;

use crate::backend::error::BackendError;

/// Begins, commits and rolls back transactions of one backing store
#[async_trait]
pub trait Transactor: Send + Sync + 'static {
    /// Opaque transaction handle
    type Tx: Send + 'static;

    async fn begin(&self) -> Result<Self::Tx, BackendError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), BackendError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), BackendError>;
}

/// Runs closures atomically against a [`Transactor`]
pub struct Coordinator<T> {
    transactor: Arc<T>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            transactor: Arc::clone(&self.transactor),
        }
    }
}

impl<T: Transactor> Coordinator<T> {
    pub fn new(transactor: Arc<T>) -> Self {
        Self { transactor }
    }

    /// Execute `work` inside a fresh transaction
    ///
    /// Commits when `work` returns `Ok`, rolls back otherwise. A failed
    /// rollback is logged and the original error is returned.
    pub async fn run<R, F>(&self, work: F) -> Result<R, BackendError>
    where
        R: Send,
        F: for<'t> FnOnce(&'t mut T::Tx) -> BoxFuture<'t, Result<R, BackendError>> + Send,
    {
        let mut tx = self.transactor.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                self.transactor.commit(tx).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.transactor.rollback(tx).await {
                    tracing::warn!("[Tx] rollback after '{}' failed: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Postgres transaction handle used by [`PgStore`](super::PgStore)
pub type PgTx = Transaction<'static, Postgres>;

/// The connection a single query runs on
pub enum DbHandle<'a> {
    /// A connection checked out of the pool for one auto-committed call
    Pooled(PoolConnection<Postgres>),
    /// The connection owned by an open unit of work
    InTx(&'a mut PgConnection),
}

impl DbHandle<'_> {
    pub fn conn(&mut self) -> &mut PgConnection {
        match self {
            DbHandle::Pooled(conn) => &mut **conn,
            DbHandle::InTx(conn) => &mut **conn,
        }
    }
}

/// Resolve the connection for a query from the explicit unit of work
pub async fn resolve<'a>(
    pool: &PgPool,
    uow: Option<&'a mut PgTx>,
) -> Result<DbHandle<'a>, BackendError> {
    match uow {
        Some(tx) => Ok(DbHandle::InTx(&mut **tx)),
        None => Ok(DbHandle::Pooled(pool.acquire().await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTransactor {
        begun: AtomicUsize,
        committed: AtomicUsize,
        rolled_back: AtomicUsize,
        fail_rollback: bool,
    }

    #[async_trait]
    impl Transactor for CountingTransactor {
        type Tx = Vec<&'static str>;

        async fn begin(&self) -> Result<Self::Tx, BackendError> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn commit(&self, _tx: Self::Tx) -> Result<(), BackendError> {
            self.committed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(&self, _tx: Self::Tx) -> Result<(), BackendError> {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            if self.fail_rollback {
                return Err(BackendError::transient("rollback lost"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_commits_on_success() {
        let transactor = Arc::new(CountingTransactor::default());
        let coordinator = Coordinator::new(Arc::clone(&transactor));

        let value = coordinator
            .run(|tx| {
                Box::pin(async move {
                    tx.push("write");
                    Ok(tx.len())
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(transactor.committed.load(Ordering::SeqCst), 1);
        assert_eq!(transactor.rolled_back.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_rolls_back_on_error() {
        let transactor = Arc::new(CountingTransactor::default());
        let coordinator = Coordinator::new(Arc::clone(&transactor));

        let result: Result<(), _> = coordinator
            .run(|_tx| Box::pin(async move { Err(BackendError::ForbiddenAction) }))
            .await;

        assert!(matches!(result, Err(BackendError::ForbiddenAction)));
        assert_eq!(transactor.committed.load(Ordering::SeqCst), 0);
        assert_eq!(transactor.rolled_back.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rollback_failure_keeps_original_error() {
        let transactor = Arc::new(CountingTransactor {
            fail_rollback: true,
            ..Default::default()
        });
        let coordinator = Coordinator::new(Arc::clone(&transactor));

        let result: Result<(), _> = coordinator
            .run(|_tx| Box::pin(async move { Err(BackendError::ParticipantNotFound) }))
            .await;

        assert!(matches!(result, Err(BackendError::ParticipantNotFound)));
        assert_eq!(transactor.begun.load(Ordering::SeqCst), 1);
    }
}
