//! Ledger Store module
//!
//! System of record for ledger entries. The coordinator and reconciliation
//! service talk to it only through the `LedgerStore` trait; PostgreSQL and
//! in-memory adapters are provided.

mod error;
mod memory;
mod repository;
mod retry;

pub use error::StoreError;
pub(crate) use error::is_unique_violation;
pub use memory::{FaultPlan, InMemoryLedgerStore};
pub use repository::PgLedgerStore;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Account, AccountType, Amount, Currency, EntryType, LedgerEntry, OperationType};

/// Debit and credit turnover of one account in one currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountTotals {
    pub account_id: Uuid,
    pub account_type: AccountType,
    pub debits: Amount,
    pub credits: Amount,
}

/// Append-only storage of ledger entries
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Durably append all entries of one transaction, or none of them
    async fn append_entries(
        &self,
        transaction_id: Uuid,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError>;

    /// Compensation only: remove whatever was written for a failed transaction
    async fn delete_transaction_entries(&self, transaction_id: Uuid) -> Result<u64, StoreError>;

    async fn find_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Entries for one account, oldest first
    async fn find_by_account_id(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Signed balance of an account in one currency.
    /// An account with no entries has balance zero.
    async fn calculate_balance(
        &self,
        account: &Account,
        currency: &Currency,
    ) -> Result<Amount, StoreError>;

    /// Sum of `entry_type` postings of one category on `account` at or after
    /// `since`. Used for rolling caps such as daily prize limits.
    async fn sum_postings_since(
        &self,
        account: &Account,
        currency: &Currency,
        category: OperationType,
        entry_type: EntryType,
        since: DateTime<Utc>,
    ) -> Result<Amount, StoreError>;

    /// Turnover of every account that has entries in `currency`, ordered by
    /// account id
    async fn account_totals(&self, currency: &Currency) -> Result<Vec<AccountTotals>, StoreError>;
}
