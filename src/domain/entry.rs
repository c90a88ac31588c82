//! Ledger entries
//!
//! Append-only postings. Every financial operation produces exactly one
//! debit and one credit that share a transaction id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::account::{Account, AccountType};
use super::amount::{Amount, Currency};

/// Side of a posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    pub fn opposite(&self) -> EntryType {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Debit => "debit",
            EntryType::Credit => "credit",
        }
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryType::Debit),
            "credit" => Ok(EntryType::Credit),
            other => Err(format!("unknown entry type: {}", other)),
        }
    }
}

/// Business operation an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Deposit,
    Withdrawal,
    EntryFee,
    PrizeWinning,
    Refund,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "deposit",
            OperationType::Withdrawal => "withdrawal",
            OperationType::EntryFee => "entry_fee",
            OperationType::PrizeWinning => "prize_winning",
            OperationType::Refund => "refund",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(OperationType::Deposit),
            "withdrawal" => Ok(OperationType::Withdrawal),
            "entry_fee" => Ok(OperationType::EntryFee),
            "prize_winning" => Ok(OperationType::PrizeWinning),
            "refund" => Ok(OperationType::Refund),
            other => Err(format!("unknown operation type: {}", other)),
        }
    }
}

/// Audit data attached to both entries of a transaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,

    /// On-chain transaction hash for crypto rails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<Uuid>,

    /// Entry-fee transaction this refund reverses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_of: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiated_by: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl EntryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_destination_address(mut self, address: impl Into<String>) -> Self {
        self.destination_address = Some(address.into());
        self
    }

    pub fn with_match(mut self, match_id: Uuid) -> Self {
        self.match_id = Some(match_id);
        self
    }

    pub fn with_tournament(mut self, tournament_id: Uuid) -> Self {
        self.tournament_id = Some(tournament_id);
        self
    }

    pub fn with_refund_of(mut self, transaction_id: Uuid) -> Self {
        self.refund_of = Some(transaction_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A single immutable posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub account_type: AccountType,
    pub entry_type: EntryType,
    pub category: OperationType,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub metadata: EntryMetadata,
}

impl LedgerEntry {
    /// Contribution of this entry to its own account's balance
    pub fn signed_minor(&self) -> i64 {
        self.account_type
            .signed_contribution(self.entry_type, self.amount.minor())
    }

    pub fn currency(&self) -> &Currency {
        self.amount.currency()
    }
}

/// Reasons a posting pair cannot be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PostingError {
    #[error("Posting amount must be positive (got {0})")]
    NonPositiveAmount(Amount),

    #[error("Debit and credit must hit different accounts ({0})")]
    SameAccount(Uuid),
}

/// A group of entries sharing one transaction id
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub category: OperationType,
    pub entries: Vec<LedgerEntry>,
}

impl Transaction {
    /// Build the balanced debit/credit pair for one operation.
    ///
    /// The debit is always entries[0] and the credit entries[1].
    pub fn pair(
        category: OperationType,
        debit: &Account,
        credit: &Account,
        amount: Amount,
        metadata: EntryMetadata,
    ) -> Result<Self, PostingError> {
        if !amount.is_positive() {
            return Err(PostingError::NonPositiveAmount(amount));
        }
        if debit.id == credit.id {
            return Err(PostingError::SameAccount(debit.id));
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let posting = |account: &Account, entry_type: EntryType| LedgerEntry {
            id: Uuid::new_v4(),
            transaction_id: id,
            account_id: account.id,
            account_type: account.account_type,
            entry_type,
            category,
            amount: amount.clone(),
            created_at,
            metadata: metadata.clone(),
        };

        Ok(Self {
            id,
            category,
            entries: vec![
                posting(debit, EntryType::Debit),
                posting(credit, EntryType::Credit),
            ],
        })
    }

    pub fn status(&self) -> TransactionStatus {
        derive_status(&self.entries)
    }

    /// The entry posted to the given account, if any
    pub fn entry_for(&self, account_id: Uuid) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.account_id == account_id)
    }
}

/// Status of a transaction, derived from its entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransactionStatus {
    Missing,
    Balanced,
    Unbalanced {
        currency: Currency,
        debits: i128,
        credits: i128,
    },
}

impl TransactionStatus {
    pub fn is_balanced(&self) -> bool {
        matches!(self, TransactionStatus::Balanced)
    }
}

/// Check Σ debits == Σ credits per currency
pub fn derive_status(entries: &[LedgerEntry]) -> TransactionStatus {
    if entries.is_empty() {
        return TransactionStatus::Missing;
    }

    let mut sums: BTreeMap<&Currency, (i128, i128)> = BTreeMap::new();
    for entry in entries {
        let slot = sums.entry(entry.currency()).or_insert((0, 0));
        match entry.entry_type {
            EntryType::Debit => slot.0 += i128::from(entry.amount.minor()),
            EntryType::Credit => slot.1 += i128::from(entry.amount.minor()),
        }
    }

    for (currency, (debits, credits)) in sums {
        if debits != credits {
            return TransactionStatus::Unbalanced {
                currency: currency.clone(),
                debits,
                credits,
            };
        }
    }

    TransactionStatus::Balanced
}
