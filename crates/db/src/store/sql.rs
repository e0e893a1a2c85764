use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use goodpoint_core::chrono::{DateTime, Utc};
use goodpoint_core::domain::transaction::{PointTransaction, TransactionDraft, TransactionId};
use goodpoint_core::domain::user::{UserId, UserTally};
use goodpoint_core::store::{
    AggregateStore, LedgerStore, LedgerUnit, StoreError, TransactionLog, UnitFuture,
};

use crate::DbPool;

/// SQLite-backed ledger store. One atomic unit maps to one database
/// transaction; SQLite's single-writer serialization provides the required
/// isolation, and unresolved contention surfaces as [`StoreError`].
pub struct SqlLedgerStore {
    pool: DbPool,
}

impl SqlLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionLog for SqlLedgerStore {
    async fn transactions_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PointTransaction>, StoreError> {
        let rows = sqlx::query(
            "SELECT
                id,
                sender_id,
                receiver_id,
                reason,
                points,
                created_at,
                updated_at
             FROM point_transaction
             WHERE created_at >= ?
             ORDER BY created_at DESC",
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query)?;

        rows.into_iter().map(transaction_from_row).collect()
    }
}

#[async_trait]
impl AggregateStore for SqlLedgerStore {
    async fn top_tallies(&self, limit: u32) -> Result<Vec<UserTally>, StoreError> {
        let rows = sqlx::query(
            "SELECT user_id, points
             FROM user_tally
             ORDER BY points DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::query)?;

        rows.into_iter().map(tally_from_row).collect()
    }
}

impl LedgerStore for SqlLedgerStore {
    fn atomic<'a, T, E, F>(&'a self, op: F) -> UnitFuture<'a, T, E>
    where
        T: Send + 'a,
        E: From<StoreError> + Send + 'a,
        F: for<'u> FnOnce(&'u mut dyn LedgerUnit) -> UnitFuture<'u, T, E> + Send + 'a,
    {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(|error| E::from(StoreError::commit(error)))?;
            let mut unit = SqlLedgerUnit { tx };
            let outcome = op(&mut unit).await;
            match outcome {
                Ok(value) => {
                    unit.tx
                        .commit()
                        .await
                        .map_err(|error| E::from(StoreError::commit(error)))?;
                    Ok(value)
                }
                Err(error) => {
                    let _ = unit.tx.rollback().await;
                    Err(error)
                }
            }
        })
    }
}

struct SqlLedgerUnit {
    tx: sqlx::Transaction<'static, sqlx::Sqlite>,
}

#[async_trait]
impl LedgerUnit for SqlLedgerUnit {
    async fn append(&mut self, draft: TransactionDraft) -> Result<PointTransaction, StoreError> {
        let id = TransactionId(Uuid::new_v4().to_string());
        sqlx::query(
            "INSERT INTO point_transaction (
                id,
                sender_id,
                receiver_id,
                reason,
                points,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(&draft.sender_id.0)
        .bind(&draft.receiver_id.0)
        .bind(&draft.reason)
        .bind(draft.points)
        .bind(draft.created_at.to_rfc3339())
        .bind(draft.updated_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::query)?;

        Ok(draft.into_transaction(id))
    }

    async fn find(&mut self, id: &TransactionId) -> Result<Option<PointTransaction>, StoreError> {
        let row = sqlx::query(
            "SELECT
                id,
                sender_id,
                receiver_id,
                reason,
                points,
                created_at,
                updated_at
             FROM point_transaction
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::query)?;

        row.map(transaction_from_row).transpose()
    }

    async fn remove(&mut self, id: &TransactionId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM point_transaction WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::query)?;
        Ok(())
    }

    async fn tally(&mut self, user: &UserId) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT points FROM user_tally WHERE user_id = ?")
            .bind(&user.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::query)?;

        row.map(|row| row.try_get::<i64, _>("points").map_err(StoreError::decode)).transpose()
    }

    async fn set_tally(&mut self, user: &UserId, points: i64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_tally (user_id, points) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET points = excluded.points",
        )
        .bind(&user.0)
        .bind(points)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::query)?;
        Ok(())
    }
}

fn transaction_from_row(row: SqliteRow) -> Result<PointTransaction, StoreError> {
    Ok(PointTransaction {
        id: TransactionId(row.try_get("id").map_err(StoreError::decode)?),
        sender_id: UserId(row.try_get("sender_id").map_err(StoreError::decode)?),
        receiver_id: UserId(row.try_get("receiver_id").map_err(StoreError::decode)?),
        reason: row.try_get("reason").map_err(StoreError::decode)?,
        points: row.try_get("points").map_err(StoreError::decode)?,
        created_at: parse_timestamp(row.try_get("created_at").map_err(StoreError::decode)?)?,
        updated_at: parse_timestamp(row.try_get("updated_at").map_err(StoreError::decode)?)?,
    })
}

fn tally_from_row(row: SqliteRow) -> Result<UserTally, StoreError> {
    Ok(UserTally {
        user_id: UserId(row.try_get("user_id").map_err(StoreError::decode)?),
        points: row.try_get("points").map_err(StoreError::decode)?,
    })
}

fn parse_timestamp(raw: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(StoreError::decode)
}
