//! In-memory wallet store

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::domain::Wallet;
use crate::ledger_store::StoreError;

use super::WalletStore;

#[derive(Debug, Default)]
pub struct InMemoryWalletStore {
    wallets: Mutex<BTreeMap<Uuid, Wallet>>,
    fail_saves: AtomicBool,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save fail until switched off
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn save(&self, wallet: &Wallet) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save fault".to_string()));
        }

        let mut wallets = self.wallets.lock();
        if let Some(stored) = wallets.get(&wallet.id()) {
            if wallet.version() != stored.version() + 1 {
                return Err(StoreError::VersionConflict {
                    id: wallet.id(),
                    expected: stored.version() + 1,
                    actual: wallet.version(),
                });
            }
        }
        wallets.insert(wallet.id(), wallet.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.wallets.lock().get(&id).cloned())
    }

    async fn list_ids(&self, limit: i64, offset: i64) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .wallets
            .lock()
            .keys()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_requires_next_version() {
        let store = InMemoryWalletStore::new();
        let mut wallet = Wallet::new(Uuid::new_v4());
        store.save(&wallet).await.unwrap();

        // Same version again is stale
        let stale = store.save(&wallet).await;
        assert!(matches!(stale, Err(StoreError::VersionConflict { expected: 1, actual: 0, .. })));

        wallet.record_change();
        store.save(&wallet).await.unwrap();
        assert_eq!(store.find_by_id(wallet.id()).await.unwrap().unwrap().version(), 1);
    }

    #[tokio::test]
    async fn test_injected_save_fault() {
        let store = InMemoryWalletStore::new();
        store.set_fail_saves(true);
        assert!(store.save(&Wallet::new(Uuid::new_v4())).await.is_err());
        store.set_fail_saves(false);
        assert!(store.save(&Wallet::new(Uuid::new_v4())).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_ids_pages() {
        let store = InMemoryWalletStore::new();
        for _ in 0..5 {
            store.save(&Wallet::new(Uuid::new_v4())).await.unwrap();
        }
        assert_eq!(store.list_ids(2, 0).await.unwrap().len(), 2);
        assert_eq!(store.list_ids(10, 4).await.unwrap().len(), 1);
    }
}
