//! Coordinator module
//!
//! Orchestrates financial intents into idempotent, balanced ledger postings.

mod intent;
mod locks;
mod service;
mod tests;

pub use intent::{
    BalanceCorrection, ExecutionReceipt, FinancialIntent, PrizeDistributionReport, PrizePayout,
};
pub use locks::WalletLocks;
pub use service::{CoordinatorSettings, TransactionCoordinator};
