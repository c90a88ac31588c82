//! In-memory ledger store
//!
//! Process-local adapter used by tests and embedded deployments. Supports
//! fault injection so compensation paths can be exercised deterministically.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{Account, AccountType, Amount, Currency, EntryType, LedgerEntry, OperationType};

use super::{AccountTotals, LedgerStore, StoreError};

/// Faults to inject into the next store calls
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Next append writes this many entries, then fails. Fires once.
    pub fail_append_after: Option<usize>,
    /// Compensating deletes return an error
    pub fail_deletes: bool,
    /// Compensating deletes report success but remove nothing
    pub silent_delete_failure: bool,
    /// Balance and lookup reads return an error
    pub fail_reads: bool,
}

impl FaultPlan {
    pub fn fail_append_after(entries: usize) -> Self {
        Self {
            fail_append_after: Some(entries),
            ..Self::default()
        }
    }

    pub fn and_fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn and_silent_delete_failure(mut self) -> Self {
        self.silent_delete_failure = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
    faults: Mutex<FaultPlan>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&self, plan: FaultPlan) {
        *self.faults.lock() = plan;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = FaultPlan::default();
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Snapshot of every entry, in append order
    pub fn all_entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().clone()
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.faults.lock().fail_reads {
            return Err(StoreError::Unavailable("injected read fault".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append_entries(
        &self,
        transaction_id: Uuid,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        if entries.iter().any(|e| e.transaction_id != transaction_id) {
            return Err(StoreError::Corrupt(format!(
                "entry does not belong to transaction {}",
                transaction_id
            )));
        }

        let fail_after = self.faults.lock().fail_append_after.take();
        let mut stored = self.entries.lock();

        if stored.iter().any(|e| e.transaction_id == transaction_id) {
            return Err(StoreError::DuplicateKey(transaction_id.to_string()));
        }

        match fail_after {
            Some(limit) if limit < entries.len() => {
                stored.extend(entries.iter().take(limit).cloned());
                Err(StoreError::Unavailable(format!(
                    "injected fault after {} of {} entries",
                    limit,
                    entries.len()
                )))
            }
            _ => {
                stored.extend(entries.iter().cloned());
                Ok(())
            }
        }
    }

    async fn delete_transaction_entries(&self, transaction_id: Uuid) -> Result<u64, StoreError> {
        let faults = self.faults.lock().clone();
        if faults.fail_deletes {
            return Err(StoreError::Unavailable("injected delete fault".to_string()));
        }
        if faults.silent_delete_failure {
            return Ok(0);
        }

        let mut stored = self.entries.lock();
        let before = stored.len();
        stored.retain(|e| e.transaction_id != transaction_id);
        Ok((before - stored.len()) as u64)
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.check_reads()?;
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn find_by_account_id(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.check_reads()?;
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.account_id == account_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn calculate_balance(
        &self,
        account: &Account,
        currency: &Currency,
    ) -> Result<Amount, StoreError> {
        self.check_reads()?;
        let total: i128 = self
            .entries
            .lock()
            .iter()
            .filter(|e| e.account_id == account.id && e.currency() == currency)
            .map(|e| {
                i128::from(
                    account
                        .account_type
                        .signed_contribution(e.entry_type, e.amount.minor()),
                )
            })
            .sum();

        let minor = i64::try_from(total)
            .map_err(|_| StoreError::Corrupt(format!("balance overflow on {}", account.id)))?;
        Ok(Amount::from_minor(minor, currency.clone()))
    }

    async fn sum_postings_since(
        &self,
        account: &Account,
        currency: &Currency,
        category: OperationType,
        entry_type: EntryType,
        since: DateTime<Utc>,
    ) -> Result<Amount, StoreError> {
        self.check_reads()?;
        let total: i128 = self
            .entries
            .lock()
            .iter()
            .filter(|e| {
                e.account_id == account.id
                    && e.currency() == currency
                    && e.category == category
                    && e.entry_type == entry_type
                    && e.created_at >= since
            })
            .map(|e| i128::from(e.amount.minor()))
            .sum();

        let minor = i64::try_from(total)
            .map_err(|_| StoreError::Corrupt(format!("window sum overflow on {}", account.id)))?;
        Ok(Amount::from_minor(minor, currency.clone()))
    }

    async fn account_totals(&self, currency: &Currency) -> Result<Vec<AccountTotals>, StoreError> {
        self.check_reads()?;
        let mut sums: BTreeMap<Uuid, (AccountType, i128, i128)> = BTreeMap::new();
        for entry in self.entries.lock().iter().filter(|e| e.currency() == currency) {
            let slot = sums
                .entry(entry.account_id)
                .or_insert((entry.account_type, 0, 0));
            match entry.entry_type {
                EntryType::Debit => slot.1 += i128::from(entry.amount.minor()),
                EntryType::Credit => slot.2 += i128::from(entry.amount.minor()),
            }
        }

        sums.into_iter()
            .map(|(account_id, (account_type, debits, credits))| -> Result<AccountTotals, StoreError> {
                let to_amount = |sum: i128| {
                    i64::try_from(sum)
                        .map(|minor| Amount::from_minor(minor, currency.clone()))
                        .map_err(|_| StoreError::Corrupt(format!("turnover overflow on {}", account_id)))
                };
                Ok(AccountTotals {
                    account_id,
                    account_type,
                    debits: to_amount(debits)?,
                    credits: to_amount(credits)?,
                })
            })
            .collect()
    }
}
