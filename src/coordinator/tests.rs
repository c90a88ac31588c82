//! Coordinator tests against the in-memory stores
//!
//! Scenario-level properties live in tests/coordinator_scenarios.rs; these
//! cover validation, locking and cancellation edges.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    use crate::alert::RecordingAlertSink;
    use crate::coordinator::{CoordinatorSettings, TransactionCoordinator};
    use crate::domain::{
        Account, Amount, Currency, EntryMetadata, EntryType, LedgerEntry, OperationContext,
        OperationType, SystemAccounts, Wallet,
    };
    use crate::error::LedgerError;
    use crate::idempotency::InMemoryIdempotencyGuard;
    use crate::ledger_store::{AccountTotals, FaultPlan, InMemoryLedgerStore, LedgerStore, StoreError};
    use crate::wallet_store::InMemoryWalletStore;

    /// Delays appends so a caller can be made to wait on the wallet lock
    struct SlowLedger {
        inner: InMemoryLedgerStore,
        append_delay: Duration,
    }

    #[async_trait]
    impl LedgerStore for SlowLedger {
        async fn append_entries(
            &self,
            transaction_id: Uuid,
            entries: &[LedgerEntry],
        ) -> Result<(), StoreError> {
            tokio::time::sleep(self.append_delay).await;
            self.inner.append_entries(transaction_id, entries).await
        }

        async fn delete_transaction_entries(&self, transaction_id: Uuid) -> Result<u64, StoreError> {
            self.inner.delete_transaction_entries(transaction_id).await
        }

        async fn find_by_transaction_id(
            &self,
            transaction_id: Uuid,
        ) -> Result<Vec<LedgerEntry>, StoreError> {
            self.inner.find_by_transaction_id(transaction_id).await
        }

        async fn find_by_account_id(
            &self,
            account_id: Uuid,
            limit: i64,
            offset: i64,
        ) -> Result<Vec<LedgerEntry>, StoreError> {
            self.inner.find_by_account_id(account_id, limit, offset).await
        }

        async fn calculate_balance(
            &self,
            account: &Account,
            currency: &Currency,
        ) -> Result<Amount, StoreError> {
            self.inner.calculate_balance(account, currency).await
        }

        async fn sum_postings_since(
            &self,
            account: &Account,
            currency: &Currency,
            category: OperationType,
            entry_type: EntryType,
            since: DateTime<Utc>,
        ) -> Result<Amount, StoreError> {
            self.inner
                .sum_postings_since(account, currency, category, entry_type, since)
                .await
        }

        async fn account_totals(&self, currency: &Currency) -> Result<Vec<AccountTotals>, StoreError> {
            self.inner.account_totals(currency).await
        }
    }

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    fn usd_amount(minor: i64) -> Amount {
        Amount::from_minor(minor, usd())
    }

    fn system() -> SystemAccounts {
        SystemAccounts::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
    }

    fn coordinator_with(ledger: Arc<dyn LedgerStore>, settings: CoordinatorSettings) -> TransactionCoordinator {
        TransactionCoordinator::new(
            ledger,
            Arc::new(InMemoryIdempotencyGuard::new()),
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(RecordingAlertSink::new()),
            system(),
        )
        .with_settings(settings)
    }

    async fn funded(coordinator: &TransactionCoordinator, minor: i64) -> Wallet {
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        coordinator
            .execute_deposit(
                &OperationContext::new(),
                &wallet,
                &usd(),
                usd_amount(minor),
                &format!("seed-{}", wallet.id()),
                EntryMetadata::new(),
            )
            .await
            .unwrap();
        wallet
    }

    // =========================================================================
    // Input validation
    // =========================================================================

    #[tokio::test]
    async fn test_rejects_malformed_requests_without_writing() {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let coordinator = coordinator_with(ledger.clone(), CoordinatorSettings::default());
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        let ctx = OperationContext::new();

        let zero = coordinator
            .execute_deposit(&ctx, &wallet, &usd(), usd_amount(0), "k1", EntryMetadata::new())
            .await;
        assert!(matches!(zero, Err(LedgerError::InvalidAmount(_))));

        let negative = coordinator
            .execute_deposit(&ctx, &wallet, &usd(), usd_amount(-5), "k2", EntryMetadata::new())
            .await;
        assert!(matches!(negative, Err(LedgerError::InvalidAmount(_))));

        let eur = Amount::from_minor(100, Currency::new("EUR").unwrap());
        let mismatch = coordinator
            .execute_deposit(&ctx, &wallet, &usd(), eur, "k3", EntryMetadata::new())
            .await;
        assert!(matches!(mismatch, Err(LedgerError::CurrencyMismatch { .. })));

        let no_key = coordinator
            .execute_deposit(&ctx, &wallet, &usd(), usd_amount(100), "  ", EntryMetadata::new())
            .await;
        assert!(matches!(no_key, Err(LedgerError::InvalidRequest(_))));

        assert_eq!(ledger.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let coordinator = coordinator_with(
            Arc::new(InMemoryLedgerStore::new()),
            CoordinatorSettings::default(),
        );
        let ghost = Wallet::new(Uuid::new_v4());

        let result = coordinator
            .execute_deposit(
                &OperationContext::new(),
                &ghost,
                &usd(),
                usd_amount(100),
                "ghost",
                EntryMetadata::new(),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::WalletNotFound(id)) if id == ghost.id()));
    }

    #[tokio::test]
    async fn test_withdrawal_from_untouched_currency_allocates_nothing() {
        let coordinator = coordinator_with(
            Arc::new(InMemoryLedgerStore::new()),
            CoordinatorSettings::default(),
        );
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();

        let result = coordinator
            .execute_withdrawal(
                &OperationContext::new(),
                &wallet,
                &usd(),
                usd_amount(100),
                "w",
                EntryMetadata::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { ref available, .. }) if available.is_zero()
        ));
        let reloaded = coordinator.load_wallet(wallet.id()).await.unwrap();
        assert!(reloaded.asset_account(&usd()).is_none());
        assert_eq!(reloaded.version(), 0);
    }

    // =========================================================================
    // Locking and cancellation
    // =========================================================================

    #[tokio::test]
    async fn test_lock_timeout_is_retryable() {
        let ledger = Arc::new(SlowLedger {
            inner: InMemoryLedgerStore::new(),
            append_delay: Duration::from_millis(300),
        });
        let settings = CoordinatorSettings {
            lock_timeout: Duration::from_millis(30),
            ..CoordinatorSettings::default()
        };
        let coordinator = coordinator_with(ledger, settings);
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();

        let slow = {
            let coordinator = coordinator.clone();
            let wallet = wallet.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_deposit(
                        &OperationContext::new(),
                        &wallet,
                        &usd(),
                        usd_amount(100),
                        "slow",
                        EntryMetadata::new(),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let blocked = coordinator
            .execute_deposit(
                &OperationContext::new(),
                &wallet,
                &usd(),
                usd_amount(100),
                "blocked",
                EntryMetadata::new(),
            )
            .await;

        let err = blocked.unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout { resource, .. } if resource == wallet.id()));
        assert!(err.is_retryable());
        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_expired_deadline_cancels_before_commit() {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let coordinator = coordinator_with(ledger.clone(), CoordinatorSettings::default());
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();

        let ctx = OperationContext::new().with_deadline(tokio::time::Instant::now());
        let result = coordinator
            .execute_deposit(&ctx, &wallet, &usd(), usd_amount(100), "late", EntryMetadata::new())
            .await;

        assert!(matches!(result, Err(LedgerError::Cancelled)));
        assert_eq!(ledger.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_bounds_lock_wait() {
        let ledger = Arc::new(SlowLedger {
            inner: InMemoryLedgerStore::new(),
            append_delay: Duration::from_millis(300),
        });
        let coordinator = coordinator_with(ledger, CoordinatorSettings::default());
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();

        let holder = {
            let coordinator = coordinator.clone();
            let wallet = wallet.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_deposit(
                        &OperationContext::new(),
                        &wallet,
                        &usd(),
                        usd_amount(100),
                        "holder",
                        EntryMetadata::new(),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let ctx = OperationContext::new().with_timeout(Duration::from_millis(30));
        let result = coordinator
            .execute_deposit(&ctx, &wallet, &usd(), usd_amount(100), "waiter", EntryMetadata::new())
            .await;

        assert!(matches!(result, Err(LedgerError::Cancelled)));
        assert!(holder.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_dropped_caller_after_commit_point_still_completes() {
        let inner = Arc::new(SlowLedger {
            inner: InMemoryLedgerStore::new(),
            append_delay: Duration::from_millis(100),
        });
        let coordinator = coordinator_with(inner.clone(), CoordinatorSettings::default());
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();

        let caller = {
            let coordinator = coordinator.clone();
            let wallet = wallet.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_deposit(
                        &OperationContext::new(),
                        &wallet,
                        &usd(),
                        usd_amount(2500),
                        "dropped",
                        EntryMetadata::new(),
                    )
                    .await
            })
        };

        // Let the caller reach the slow append, then abandon it
        tokio::time::sleep(Duration::from_millis(30)).await;
        caller.abort();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(inner.inner.entry_count(), 2);
        let reloaded = coordinator.load_wallet(wallet.id()).await.unwrap();
        assert_eq!(reloaded.get_balance(&usd()).minor(), 2500);

        // A retry with the same key replays the finished transaction
        let retry = coordinator
            .execute_deposit(
                &OperationContext::new(),
                &wallet,
                &usd(),
                usd_amount(2500),
                "dropped",
                EntryMetadata::new(),
            )
            .await
            .unwrap();
        assert!(retry.replayed);
        assert_eq!(inner.inner.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_retry_during_failed_commit_is_not_a_replay() {
        let ledger = Arc::new(SlowLedger {
            inner: InMemoryLedgerStore::new(),
            append_delay: Duration::from_millis(200),
        });
        let coordinator = coordinator_with(ledger.clone(), CoordinatorSettings::default());
        let wallet = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        ledger.inner.inject(FaultPlan::fail_append_after(0));

        let first = {
            let coordinator = coordinator.clone();
            let wallet = wallet.clone();
            tokio::spawn(async move {
                coordinator
                    .execute_deposit(
                        &OperationContext::new(),
                        &wallet,
                        &usd(),
                        usd_amount(100),
                        "retried",
                        EntryMetadata::new(),
                    )
                    .await
            })
        };

        // The first call has claimed the key and is inside the failing append
        tokio::time::sleep(Duration::from_millis(50)).await;
        let retry = coordinator
            .execute_deposit(
                &OperationContext::new(),
                &wallet,
                &usd(),
                usd_amount(100),
                "retried",
                EntryMetadata::new(),
            )
            .await
            .unwrap();

        let failed_id = match first.await.unwrap() {
            Err(LedgerError::LedgerWriteFailed { transaction_id, .. }) => transaction_id,
            other => panic!("expected LedgerWriteFailed, got {:?}", other),
        };
        assert!(!retry.replayed);
        assert_ne!(retry.transaction_id, failed_id);
        assert!(ledger.inner.find_by_transaction_id(failed_id).await.unwrap().is_empty());
        assert_eq!(
            ledger.inner.find_by_transaction_id(retry.transaction_id).await.unwrap().len(),
            2
        );

        let reloaded = coordinator.load_wallet(wallet.id()).await.unwrap();
        assert_eq!(reloaded.get_balance(&usd()).minor(), 100);
    }

    #[tokio::test]
    async fn test_refunds_on_different_wallets_run_in_parallel() {
        let ledger = Arc::new(SlowLedger {
            inner: InMemoryLedgerStore::new(),
            append_delay: Duration::from_millis(200),
        });
        let settings = CoordinatorSettings {
            lock_timeout: Duration::from_millis(30),
            ..CoordinatorSettings::default()
        };
        let coordinator = coordinator_with(ledger, settings);
        let ctx = OperationContext::new();

        let mut fees = Vec::new();
        for _ in 0..2 {
            let wallet = funded(&coordinator, 5000).await;
            let fee = coordinator
                .execute_entry_fee(
                    &ctx,
                    &wallet,
                    &usd(),
                    usd_amount(1000),
                    Some(Uuid::new_v4()),
                    None,
                    &format!("fee-{}", wallet.id()),
                    EntryMetadata::new(),
                )
                .await
                .unwrap();
            fees.push((wallet, fee.transaction_id));
        }

        let mut handles = Vec::new();
        for (wallet, fee_id) in fees.clone() {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .execute_refund(
                        &OperationContext::new(),
                        &wallet,
                        &usd(),
                        usd_amount(1000),
                        &format!("refund-{}", wallet.id()),
                        EntryMetadata::new().with_refund_of(fee_id),
                    )
                    .await
            }));
        }

        for handle in handles {
            let receipt = handle.await.unwrap().unwrap();
            assert!(!receipt.replayed);
        }
        for (wallet, _) in fees {
            let reloaded = coordinator.load_wallet(wallet.id()).await.unwrap();
            assert_eq!(reloaded.get_balance(&usd()).minor(), 5000);
        }
    }

    // =========================================================================
    // Refund source checks
    // =========================================================================

    #[tokio::test]
    async fn test_refund_requires_matching_entry_fee() {
        let coordinator = coordinator_with(
            Arc::new(InMemoryLedgerStore::new()),
            CoordinatorSettings::default(),
        );
        let ctx = OperationContext::new();
        let wallet = funded(&coordinator, 10000).await;
        let other = funded(&coordinator, 10000).await;

        let fee = coordinator
            .execute_entry_fee(
                &ctx,
                &wallet,
                &usd(),
                usd_amount(1000),
                Some(Uuid::new_v4()),
                None,
                "fee-1",
                EntryMetadata::new(),
            )
            .await
            .unwrap();

        // Another wallet cannot claim this fee
        let stolen = coordinator
            .execute_refund(
                &ctx,
                &other,
                &usd(),
                usd_amount(1000),
                "refund-other",
                EntryMetadata::new().with_refund_of(fee.transaction_id),
            )
            .await;
        assert!(matches!(stolen, Err(LedgerError::InvalidReference(_))));

        // Keep revenue funded so only the fee cap can reject below
        coordinator
            .execute_entry_fee(
                &ctx,
                &other,
                &usd(),
                usd_amount(1000),
                None,
                Some(Uuid::new_v4()),
                "fee-2",
                EntryMetadata::new(),
            )
            .await
            .unwrap();

        // Partial refunds are fine until they exceed the fee
        let partial = coordinator
            .execute_refund(
                &ctx,
                &wallet,
                &usd(),
                usd_amount(600),
                "refund-1",
                EntryMetadata::new().with_refund_of(fee.transaction_id),
            )
            .await;
        assert!(partial.is_ok());

        let excess = coordinator
            .execute_refund(
                &ctx,
                &wallet,
                &usd(),
                usd_amount(500),
                "refund-2",
                EntryMetadata::new().with_refund_of(fee.transaction_id),
            )
            .await;
        assert!(matches!(excess, Err(LedgerError::InvalidReference(_))));

        let reloaded = coordinator.load_wallet(wallet.id()).await.unwrap();
        assert_eq!(reloaded.get_balance(&usd()).minor(), 10000 - 1000 + 600);
    }

    #[tokio::test]
    async fn test_refund_limited_by_revenue_balance() {
        let coordinator = coordinator_with(
            Arc::new(InMemoryLedgerStore::new()),
            CoordinatorSettings::default(),
        );
        let wallet = funded(&coordinator, 10000).await;

        let result = coordinator
            .execute_refund(
                &OperationContext::new(),
                &wallet,
                &usd(),
                usd_amount(100),
                "refund-empty",
                EntryMetadata::new(),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
    }

    // =========================================================================
    // Prize distribution
    // =========================================================================

    #[tokio::test]
    async fn test_prize_distribution_splits_pool_exactly() {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let coordinator = coordinator_with(ledger.clone(), CoordinatorSettings::default());
        let ctx = OperationContext::new();

        let a = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        let b = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        let c = coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();

        let shares = [(a.id(), 5000), (b.id(), 3000), (c.id(), 2000)];
        let report = coordinator
            .execute_prize_distribution(
                &ctx,
                usd_amount(10001),
                &shares,
                usd_amount(1_000_000),
                "tournament-9",
                EntryMetadata::new().with_tournament(Uuid::new_v4()),
            )
            .await
            .unwrap();

        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed().count(), 0);

        let expense = coordinator.system_accounts().expense();
        let paid = ledger.calculate_balance(&expense, &usd()).await.unwrap();
        assert_eq!(paid.minor(), 10001);

        // Resubmitting replays every payout
        let again = coordinator
            .execute_prize_distribution(
                &ctx,
                usd_amount(10001),
                &shares,
                usd_amount(1_000_000),
                "tournament-9",
                EntryMetadata::new(),
            )
            .await
            .unwrap();
        assert!(again
            .payouts
            .iter()
            .all(|p| p.outcome.as_ref().map(|r| r.replayed).unwrap_or(false)));
        assert_eq!(ledger.entry_count(), 6);
    }
}
