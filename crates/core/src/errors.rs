use thiserror::Error;

use crate::store::StoreError;

/// Rejections raised before any store is touched. Never worth retrying.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("grant receiver must not be empty")]
    EmptyReceiver,
    #[error("grant reason must not be empty")]
    EmptyReason,
    #[error("grant amount must be positive, got {amount}")]
    NonPositiveAmount { amount: i64 },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The atomic unit failed to commit. No partial write is observable;
    /// the caller may retry the whole operation (a retried grant records a
    /// second transaction, a retried reversal is a safe no-op).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A live transaction references a receiver with no tally record. This
    /// points at data written outside the atomic unit's guarantee; it is
    /// reported, never silently repaired.
    #[error("transaction {transaction_id} is addressed to user {user_id} which has no tally record")]
    InconsistentState {
        transaction_id: String,
        user_id: String,
    },
}

impl LedgerError {
    /// True for rejections the caller should report as a bad request rather
    /// than a failure of the ledger itself.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
