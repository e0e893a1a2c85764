use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use goodpoint_core::chrono::{DateTime, Utc};
use goodpoint_core::domain::transaction::{PointTransaction, TransactionDraft, TransactionId};
use goodpoint_core::domain::user::{UserId, UserTally};
use goodpoint_core::store::{
    AggregateStore, LedgerStore, LedgerUnit, StoreError, TransactionLog, UnitFuture,
};

/// In-memory ledger store for tests. Units work on a scratch copy of the
/// state: `Ok` writes the copy back, any error drops it, so rollback
/// semantics match the SQL store.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Clone, Default)]
struct MemoryState {
    transactions: Vec<PointTransaction>,
    tallies: HashMap<UserId, i64>,
}

struct MemoryUnit {
    scratch: MemoryState,
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn append(&mut self, draft: TransactionDraft) -> Result<PointTransaction, StoreError> {
        let transaction = draft.into_transaction(TransactionId(Uuid::new_v4().to_string()));
        self.scratch.transactions.push(transaction.clone());
        Ok(transaction)
    }

    async fn find(&mut self, id: &TransactionId) -> Result<Option<PointTransaction>, StoreError> {
        Ok(self.scratch.transactions.iter().find(|transaction| &transaction.id == id).cloned())
    }

    async fn remove(&mut self, id: &TransactionId) -> Result<(), StoreError> {
        self.scratch.transactions.retain(|transaction| &transaction.id != id);
        Ok(())
    }

    async fn tally(&mut self, user: &UserId) -> Result<Option<i64>, StoreError> {
        Ok(self.scratch.tallies.get(user).copied())
    }

    async fn set_tally(&mut self, user: &UserId, points: i64) -> Result<(), StoreError> {
        self.scratch.tallies.insert(user.clone(), points);
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for InMemoryLedgerStore {
    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PointTransaction>, StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<PointTransaction> = state
            .transactions
            .iter()
            .filter(|transaction| transaction.created_at >= since)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

#[async_trait]
impl AggregateStore for InMemoryLedgerStore {
    async fn top_tallies(&self, limit: u32) -> Result<Vec<UserTally>, StoreError> {
        let state = self.state.lock().await;
        let mut tallies: Vec<UserTally> = state
            .tallies
            .iter()
            .map(|(user_id, points)| UserTally { user_id: user_id.clone(), points: *points })
            .collect();
        // ties ordered by user id so this backend stays deterministic
        tallies.sort_by(|a, b| {
            b.points.cmp(&a.points).then_with(|| a.user_id.0.cmp(&b.user_id.0))
        });
        tallies.truncate(limit as usize);
        Ok(tallies)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn atomic<'a, T, E, F>(&'a self, op: F) -> UnitFuture<'a, T, E>
    where
        T: Send + 'a,
        E: From<StoreError> + Send + 'a,
        F: for<'u> FnOnce(&'u mut dyn LedgerUnit) -> UnitFuture<'u, T, E> + Send + 'a,
    {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut unit = MemoryUnit { scratch: state.clone() };
            let outcome = op(&mut unit).await;
            match outcome {
                Ok(value) => {
                    *state = unit.scratch;
                    Ok(value)
                }
                Err(error) => Err(error),
            }
        })
    }
}
