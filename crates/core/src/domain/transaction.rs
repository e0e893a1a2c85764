use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Externally visible identifier of a recorded grant. Assigned by the store
/// when the grant is appended; handed back to users so a grant can be
/// reversed later.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single recorded grant of points. Immutable once written; the only way
/// out of the log is a hard delete through a reversal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: TransactionId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub reason: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field values for a grant that has not been appended yet. The store mints
/// the identifier when the enclosing atomic unit commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionDraft {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub reason: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionDraft {
    /// Completes the draft with a store-assigned identifier.
    pub fn into_transaction(self, id: TransactionId) -> PointTransaction {
        PointTransaction {
            id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            reason: self.reason,
            points: self.points,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
