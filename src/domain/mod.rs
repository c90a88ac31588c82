//! Domain module
//!
//! Money, accounts, ledger entries and wallets.

pub mod account;
pub mod amount;
pub mod context;
pub mod entry;
pub mod wallet;

pub use account::{Account, AccountOwner, AccountType, SystemAccounts};
pub use amount::{Amount, Currency, MoneyError};
pub use context::OperationContext;
pub use entry::{
    derive_status, EntryMetadata, EntryType, LedgerEntry, OperationType, PostingError,
    Transaction, TransactionStatus,
};
pub use wallet::Wallet;
