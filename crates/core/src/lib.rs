pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod store;

pub use chrono;

pub use domain::transaction::{PointTransaction, TransactionDraft, TransactionId};
pub use domain::user::{UserId, UserTally};
pub use errors::{LedgerError, ValidationError};
pub use ledger::{GrantReceipt, GrantRequest, LedgerService, ReversedGrant};
pub use store::{
    AggregateStore, LedgerStore, LedgerUnit, StoreError, TransactionLog, UnitFuture,
};
