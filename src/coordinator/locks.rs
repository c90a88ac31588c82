//! Per-wallet locks
//!
//! One async mutex per wallet id. Operations on different
//! wallets never contend.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct WalletLocks {
    inner: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl WalletLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `wait` for the lock on `id`. `None` on timeout.
    pub async fn acquire(&self, id: Uuid, wait: Duration) -> Option<OwnedMutexGuard<()>> {
        let mutex = self.inner.entry(id).or_default().clone();
        tokio::time::timeout(wait, mutex.lock_owned()).await.ok()
    }

    pub fn tracked(&self) -> usize {
        self.inner.len()
    }
}
