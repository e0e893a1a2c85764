//! Contracts for the two backing stores: the append-only transaction log and
//! the per-user aggregate store. The ledger service is written against these
//! traits; `goodpoint-db` provides the SQLite implementation.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::transaction::{PointTransaction, TransactionDraft, TransactionId};
use crate::domain::user::{UserId, UserTally};

/// Boxed future returned by atomic-unit callbacks.
pub type UnitFuture<'a, T, E = StoreError> =
    Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("atomic unit could not commit: {0}")]
    Commit(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn commit(error: impl std::fmt::Display) -> Self {
        Self::Commit(error.to_string())
    }

    pub fn query(error: impl std::fmt::Display) -> Self {
        Self::Query(error.to_string())
    }

    pub fn decode(error: impl std::fmt::Display) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Reads and writes available inside one atomic unit.
///
/// Everything done through a unit either commits in full or leaves no trace;
/// the store serializes conflicting units touching the same records and
/// surfaces unresolvable contention as [`StoreError`].
#[async_trait]
pub trait LedgerUnit: Send {
    /// Appends a grant to the transaction log and returns it with its
    /// store-assigned identifier.
    async fn append(&mut self, draft: TransactionDraft) -> Result<PointTransaction, StoreError>;

    async fn find(&mut self, id: &TransactionId) -> Result<Option<PointTransaction>, StoreError>;

    /// Hard-deletes a transaction record.
    async fn remove(&mut self, id: &TransactionId) -> Result<(), StoreError>;

    /// Current tally for a user, `None` if no grant has reached them yet.
    async fn tally(&mut self, user: &UserId) -> Result<Option<i64>, StoreError>;

    /// Creates or overwrites a user's tally record.
    async fn set_tally(&mut self, user: &UserId, points: i64) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TransactionLog: Send + Sync {
    /// All transactions with `created_at >= since`, newest first.
    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PointTransaction>, StoreError>;
}

#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Up to `limit` tallies ordered by points descending. The order of ties
    /// is backend-defined but stable for a given store.
    async fn top_tallies(&self, limit: u32) -> Result<Vec<UserTally>, StoreError>;
}

pub trait LedgerStore: TransactionLog + AggregateStore {
    /// Runs `op` against one atomic unit. The unit commits only when `op`
    /// returns `Ok`; any error rolls back every read-modify-write performed
    /// through it, so partial outcomes are never observable.
    fn atomic<'a, T, E, F>(&'a self, op: F) -> UnitFuture<'a, T, E>
    where
        T: Send + 'a,
        E: From<StoreError> + Send + 'a,
        F: for<'u> FnOnce(&'u mut dyn LedgerUnit) -> UnitFuture<'u, T, E> + Send + 'a;
}
