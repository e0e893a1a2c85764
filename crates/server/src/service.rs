use async_trait::async_trait;

use goodpoint_core::chrono::{DateTime, Utc};
use goodpoint_core::{
    GrantReceipt, GrantRequest, LedgerError, LedgerService, LedgerStore, PointTransaction,
    ReversedGrant, TransactionId, UserId, UserTally,
};
use goodpoint_slack::commands::PointCommandService;

/// Production command service: the dispatcher's view of the ledger.
pub struct LedgerCommandService<S> {
    ledger: LedgerService<S>,
}

impl<S: LedgerStore> LedgerCommandService<S> {
    pub fn new(ledger: LedgerService<S>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl<S: LedgerStore> PointCommandService for LedgerCommandService<S> {
    async fn grant_point(
        &self,
        sender: UserId,
        receiver: UserId,
        reason: String,
    ) -> Result<GrantReceipt, LedgerError> {
        self.ledger.grant(GrantRequest::single_point(sender, receiver, reason)).await
    }

    async fn reverse_grant(
        &self,
        id: TransactionId,
    ) -> Result<Option<ReversedGrant>, LedgerError> {
        self.ledger.reverse(&id).await
    }

    async fn ranking(&self, limit: u32) -> Result<Vec<UserTally>, LedgerError> {
        self.ledger.rank(limit).await
    }

    async fn history_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<PointTransaction>, LedgerError> {
        self.ledger.history(since).await
    }
}
