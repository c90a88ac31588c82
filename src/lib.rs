//! wallet_ledger Library
//!
//! Double-entry ledger for multi-currency user wallets: a transaction
//! coordinator with idempotency and compensating rollback, and a
//! reconciliation service that checks wallet caches against the ledger.

pub mod alert;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod domain;
pub mod error;
pub mod idempotency;
pub mod jobs;
pub mod ledger_store;
pub mod reconciliation;
pub mod wallet_store;

pub use config::Config;
pub use coordinator::{ExecutionReceipt, TransactionCoordinator};
pub use domain::{Amount, Currency, EntryMetadata, MoneyError, OperationContext, Wallet};
pub use error::{LedgerError, LedgerResult};
pub use reconciliation::ReconciliationService;
