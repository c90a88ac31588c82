//! Wallet Store module
//!
//! Persistence for wallets and their cached balances. Saves are
//! version-checked: a save must carry exactly the stored version plus one.

mod memory;
mod repository;

pub use memory::InMemoryWalletStore;
pub use repository::PgWalletStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Wallet;
use crate::ledger_store::StoreError;

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Insert a new wallet, or replace a stored one whose version is
    /// `wallet.version() - 1`. Anything else is a `VersionConflict`.
    async fn save(&self, wallet: &Wallet) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Wallet>, StoreError>;

    /// Wallet ids in a stable order, for batch sweeps
    async fn list_ids(&self, limit: i64, offset: i64) -> Result<Vec<Uuid>, StoreError>;
}
