//! Wallet
//!
//! A user's multi-currency wallet. Holds one asset account per currency and a
//! cache of balances; the ledger remains the system of record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::account::Account;
use super::amount::{Amount, Currency, MoneyError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    id: Uuid,
    owner_id: Uuid,
    chain_address: Option<String>,
    asset_accounts: BTreeMap<Currency, Uuid>,
    cached_balances: BTreeMap<Currency, Amount>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(owner_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            chain_address: None,
            asset_accounts: BTreeMap::new(),
            cached_balances: BTreeMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_address(owner_id: Uuid, chain_address: impl Into<String>) -> Self {
        let mut wallet = Self::new(owner_id);
        wallet.chain_address = Some(chain_address.into());
        wallet
    }

    /// Rebuild a wallet from persisted state
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        owner_id: Uuid,
        chain_address: Option<String>,
        asset_accounts: BTreeMap<Currency, Uuid>,
        cached_balances: BTreeMap<Currency, Amount>,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            chain_address,
            asset_accounts,
            cached_balances,
            version,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn chain_address(&self) -> Option<&str> {
        self.chain_address.as_deref()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn asset_accounts(&self) -> &BTreeMap<Currency, Uuid> {
        &self.asset_accounts
    }

    pub fn cached_balances(&self) -> &BTreeMap<Currency, Amount> {
        &self.cached_balances
    }

    /// Cached balance; zero for a currency the wallet never transacted in
    pub fn get_balance(&self, currency: &Currency) -> Amount {
        self.cached_balances
            .get(currency)
            .cloned()
            .unwrap_or_else(|| Amount::zero(currency.clone()))
    }

    pub fn asset_account(&self, currency: &Currency) -> Option<Account> {
        self.asset_accounts
            .get(currency)
            .map(|id| Account::wallet_asset(*id, self.id))
    }

    /// Currencies with either an asset account or a cached balance
    pub fn currencies(&self) -> Vec<Currency> {
        let mut all: Vec<Currency> = self
            .asset_accounts
            .keys()
            .chain(self.cached_balances.keys())
            .cloned()
            .collect();
        all.sort();
        all.dedup();
        all
    }

    // ===== cache mutators, coordinator only =====

    /// Returns the asset account and whether it was newly allocated
    pub(crate) fn ensure_asset_account(&mut self, currency: &Currency) -> (Account, bool) {
        if let Some(account) = self.asset_account(currency) {
            return (account, false);
        }
        let id = Uuid::new_v4();
        self.asset_accounts.insert(currency.clone(), id);
        (Account::wallet_asset(id, self.id), true)
    }

    pub(crate) fn apply_cached_delta(&mut self, delta: &Amount) -> Result<(), MoneyError> {
        let next = self.get_balance(delta.currency()).checked_add(delta)?;
        self.cached_balances.insert(delta.currency().clone(), next);
        Ok(())
    }

    pub(crate) fn set_cached_balance(&mut self, balance: Amount) {
        self.cached_balances.insert(balance.currency().clone(), balance);
    }

    /// Bump the version ahead of a save
    pub(crate) fn record_change(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}
