//! Accounts
//!
//! Ledger accounts and the well-known system accounts every posting pairs
//! against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::entry::EntryType;

/// Classification of a ledger account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Expense,
    Revenue,
}

impl AccountType {
    /// The posting side that increases an account of this type.
    ///
    /// Asset and Revenue grow with debits, Liability and Expense with credits.
    /// Entry fees move value from a wallet asset (credit) into revenue
    /// (debit), and refunds reverse that, which fixes Revenue on the debit
    /// side.
    pub fn increases_with(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Revenue => EntryType::Debit,
            AccountType::Liability | AccountType::Expense => EntryType::Credit,
        }
    }

    /// Signed contribution of a posting to this account's balance
    pub fn signed_contribution(&self, entry_type: EntryType, minor: i64) -> i64 {
        if entry_type == self.increases_with() {
            minor
        } else {
            -minor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Expense => "expense",
            AccountType::Revenue => "revenue",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "expense" => Ok(AccountType::Expense),
            "revenue" => Ok(AccountType::Revenue),
            other => Err(format!("unknown account type: {}", other)),
        }
    }
}

/// Who an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "wallet_id", rename_all = "snake_case")]
pub enum AccountOwner {
    System,
    Wallet(Uuid),
}

/// A ledger account. Balances are never stored here; they are derived from
/// entries by the ledger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub account_type: AccountType,
    pub owner: AccountOwner,
}

impl Account {
    pub fn system(id: Uuid, account_type: AccountType) -> Self {
        Self {
            id,
            account_type,
            owner: AccountOwner::System,
        }
    }

    pub fn wallet_asset(id: Uuid, wallet_id: Uuid) -> Self {
        Self {
            id,
            account_type: AccountType::Asset,
            owner: AccountOwner::Wallet(wallet_id),
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self.owner, AccountOwner::System)
    }
}

/// The three system accounts wallet postings pair against.
///
/// Resolved once at startup from configuration and shared read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemAccounts {
    liability: Uuid,
    expense: Uuid,
    revenue: Uuid,
}

impl SystemAccounts {
    pub fn new(liability: Uuid, expense: Uuid, revenue: Uuid) -> Self {
        Self {
            liability,
            expense,
            revenue,
        }
    }

    pub fn liability(&self) -> Account {
        Account::system(self.liability, AccountType::Liability)
    }

    pub fn expense(&self) -> Account {
        Account::system(self.expense, AccountType::Expense)
    }

    pub fn revenue(&self) -> Account {
        Account::system(self.revenue, AccountType::Revenue)
    }

    pub fn contains(&self, account_id: Uuid) -> bool {
        account_id == self.liability || account_id == self.expense || account_id == self.revenue
    }

    /// All three ids must differ, otherwise postings would net to nothing
    pub fn is_distinct(&self) -> bool {
        self.liability != self.expense
            && self.liability != self.revenue
            && self.expense != self.revenue
    }
}
