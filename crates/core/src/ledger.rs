//! The ledger service: grant, reverse, rank and history over the two backing
//! stores. Owns the conservation invariant between the transaction log and
//! the per-user tallies by driving every read-modify-write through one
//! atomic unit.

use chrono::{DateTime, Utc};

use crate::domain::transaction::{PointTransaction, TransactionDraft, TransactionId};
use crate::domain::user::{UserId, UserTally};
use crate::errors::{LedgerError, ValidationError};
use crate::store::LedgerStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantRequest {
    pub sender: UserId,
    pub receiver: UserId,
    pub reason: String,
    pub amount: i64,
}

impl GrantRequest {
    /// The standard grant: exactly one point.
    pub fn single_point(sender: UserId, receiver: UserId, reason: impl Into<String>) -> Self {
        Self { sender, receiver, reason: reason.into(), amount: 1 }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.receiver.0.trim().is_empty() {
            return Err(ValidationError::EmptyReceiver);
        }
        if self.reason.trim().is_empty() {
            return Err(ValidationError::EmptyReason);
        }
        if self.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount { amount: self.amount });
        }
        Ok(())
    }
}

/// Outcome of a committed grant: the recorded transaction and the receiver's
/// post-grant total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantReceipt {
    pub transaction: PointTransaction,
    pub total: i64,
}

/// Outcome of a committed reversal: the removed transaction and the
/// receiver's post-reversal total.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReversedGrant {
    pub transaction: PointTransaction,
    pub total: i64,
}

pub struct LedgerService<S> {
    store: S,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a grant and bumps the receiver's tally in one atomic unit.
    /// Returns the receipt carrying the post-grant total.
    pub async fn grant(&self, request: GrantRequest) -> Result<GrantReceipt, LedgerError> {
        request.validate()?;

        let now = Utc::now();
        let draft = TransactionDraft {
            sender_id: request.sender,
            receiver_id: request.receiver,
            reason: request.reason,
            points: request.amount,
            created_at: now,
            updated_at: now,
        };

        self.store
            .atomic(move |unit| {
                Box::pin(async move {
                    let current = unit.tally(&draft.receiver_id).await?.unwrap_or(0);
                    let total = current + draft.points;
                    let transaction = unit.append(draft).await?;
                    unit.set_tally(&transaction.receiver_id, total).await?;
                    Ok(GrantReceipt { transaction, total })
                })
            })
            .await
    }

    /// Removes a previously recorded grant and subtracts its points from the
    /// receiver's tally, atomically. Returns `None` when the id is unknown:
    /// reversing a grant that is already gone is a no-op, not an error.
    pub async fn reverse(
        &self,
        id: &TransactionId,
    ) -> Result<Option<ReversedGrant>, LedgerError> {
        let id = id.clone();
        self.store
            .atomic(move |unit| {
                Box::pin(async move {
                    let Some(transaction) = unit.find(&id).await? else {
                        return Ok(None);
                    };
                    unit.remove(&id).await?;
                    let current = unit.tally(&transaction.receiver_id).await?.ok_or_else(|| {
                        LedgerError::InconsistentState {
                            transaction_id: id.0.clone(),
                            user_id: transaction.receiver_id.0.clone(),
                        }
                    })?;
                    let total = current - transaction.points;
                    unit.set_tally(&transaction.receiver_id, total).await?;
                    Ok(Some(ReversedGrant { transaction, total }))
                })
            })
            .await
    }

    /// Top `limit` users by total points. A one-shot snapshot; an empty store
    /// or a zero limit yields an empty list.
    pub async fn rank(&self, limit: u32) -> Result<Vec<UserTally>, LedgerError> {
        Ok(self.store.top_tallies(limit).await?)
    }

    /// All transactions recorded at or after `since`, newest first. The
    /// window is caller-supplied; the service puts no bound on result size.
    pub async fn history(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PointTransaction>, LedgerError> {
        Ok(self.store.transactions_since(since).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::GrantRequest;
    use crate::domain::user::UserId;
    use crate::errors::ValidationError;

    fn request(receiver: &str, reason: &str, amount: i64) -> GrantRequest {
        GrantRequest {
            sender: UserId("U1".to_string()),
            receiver: UserId(receiver.to_string()),
            reason: reason.to_string(),
            amount,
        }
    }

    #[test]
    fn single_point_grants_one() {
        let request = GrantRequest::single_point(
            UserId("U1".to_string()),
            UserId("U2".to_string()),
            "great demo",
        );
        assert_eq!(request.amount, 1);
        request.validate().expect("single point grant should validate");
    }

    #[test]
    fn rejects_empty_receiver() {
        let error = request("  ", "great demo", 1).validate().expect_err("empty receiver");
        assert_eq!(error, ValidationError::EmptyReceiver);
    }

    #[test]
    fn rejects_empty_reason() {
        let error = request("U2", "", 1).validate().expect_err("empty reason");
        assert_eq!(error, ValidationError::EmptyReason);
    }

    #[test]
    fn rejects_non_positive_amount() {
        let error = request("U2", "great demo", 0).validate().expect_err("zero amount");
        assert_eq!(error, ValidationError::NonPositiveAmount { amount: 0 });
    }
}
