//! Financial intents and their outcomes

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Account, Amount, Currency, OperationType, SystemAccounts};
use crate::error::LedgerError;

/// What the caller wants to happen to a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinancialIntent {
    Deposit,
    Withdrawal,
    EntryFee,
    PrizeWinning { max_daily: Amount },
    Refund,
}

impl FinancialIntent {
    pub fn operation(&self) -> OperationType {
        match self {
            FinancialIntent::Deposit => OperationType::Deposit,
            FinancialIntent::Withdrawal => OperationType::Withdrawal,
            FinancialIntent::EntryFee => OperationType::EntryFee,
            FinancialIntent::PrizeWinning { .. } => OperationType::PrizeWinning,
            FinancialIntent::Refund => OperationType::Refund,
        }
    }

    /// (debit, credit) accounts for this intent
    pub fn postings(&self, asset: &Account, system: &SystemAccounts) -> (Account, Account) {
        match self {
            FinancialIntent::Deposit => (*asset, system.liability()),
            FinancialIntent::Withdrawal => (system.liability(), *asset),
            FinancialIntent::EntryFee => (system.revenue(), *asset),
            FinancialIntent::PrizeWinning { .. } => (*asset, system.expense()),
            FinancialIntent::Refund => (*asset, system.revenue()),
        }
    }

    /// Whether the intent takes value out of the wallet
    pub fn debits_wallet(&self) -> bool {
        matches!(self, FinancialIntent::Withdrawal | FinancialIntent::EntryFee)
    }
}

/// Result of a coordinated operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionReceipt {
    pub transaction_id: Uuid,
    /// The key was already bound; no new entries were written
    pub replayed: bool,
    /// False when the ledger committed but the wallet cache could not be saved
    pub cache_synced: bool,
}

impl ExecutionReceipt {
    pub(crate) fn committed(transaction_id: Uuid, cache_synced: bool) -> Self {
        Self {
            transaction_id,
            replayed: false,
            cache_synced,
        }
    }

    pub(crate) fn replayed(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            replayed: true,
            cache_synced: true,
        }
    }
}

/// Cache value overwritten by a resync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceCorrection {
    pub currency: Currency,
    pub previous: Amount,
    pub corrected: Amount,
}

/// One share of a prize pool
#[derive(Debug)]
pub struct PrizePayout {
    pub wallet_id: Uuid,
    pub amount: Amount,
    pub outcome: Result<ExecutionReceipt, LedgerError>,
}

#[derive(Debug, Default)]
pub struct PrizeDistributionReport {
    pub payouts: Vec<PrizePayout>,
}

impl PrizeDistributionReport {
    pub fn succeeded(&self) -> usize {
        self.payouts.iter().filter(|p| p.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &PrizePayout> {
        self.payouts.iter().filter(|p| p.outcome.is_err())
    }
}
