//! Transaction Coordinator
//!
//! Turns financial intents into balanced ledger postings. For every intent:
//!
//! 1. idempotency read-check (replays return the original transaction once
//!    its entries are in the ledger)
//! 2. wallet lock, then validation against the ledger-computed balance
//! 3. build one debit and one credit under a fresh transaction id
//! 4. persist any new asset account, claim the key, append the entries,
//!    compensating if the append fails
//! 5. update the wallet cache
//!
//! Steps 4 and 5 run on a spawned task that owns the locks, so a caller
//! dropping its future after the commit point cannot strand a half-applied
//! operation.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::alert::{AlertAction, AlertSink, LedgerAlertBuilder};
use crate::domain::{
    derive_status, Account, Amount, Currency, EntryMetadata, EntryType, OperationContext,
    OperationType, SystemAccounts, Transaction, Wallet,
};
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::{compute_request_hash, IdempotencyGuard, IdempotencyRecord, InsertOutcome};
use crate::ledger_store::{LedgerStore, StoreError};
use crate::wallet_store::WalletStore;

use super::intent::{
    BalanceCorrection, ExecutionReceipt, FinancialIntent, PrizeDistributionReport, PrizePayout,
};
use super::locks::WalletLocks;

const REFUND_SCAN_PAGE: i64 = 500;

/// Tunables for the coordinator
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Longest wait for a wallet lock before `LockTimeout`
    pub lock_timeout: Duration,
    /// Trailing window for the daily prize cap
    pub prize_window: chrono::Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            prize_window: chrono::Duration::hours(24),
        }
    }
}

/// A validated request travelling through the pipeline
struct OperationRequest<'a> {
    wallet_id: Uuid,
    currency: &'a Currency,
    amount: Amount,
    key: &'a str,
    metadata: EntryMetadata,
    intent: FinancialIntent,
}

/// Everything the commit task needs, owned
struct PreparedCommit {
    context: OperationContext,
    wallet: Wallet,
    asset: Account,
    account_created: bool,
    transaction: Transaction,
    key: String,
    request_hash: String,
}

#[derive(Clone)]
pub struct TransactionCoordinator {
    ledger: Arc<dyn LedgerStore>,
    idempotency: Arc<dyn IdempotencyGuard>,
    wallets: Arc<dyn WalletStore>,
    alerts: Arc<dyn AlertSink>,
    system: SystemAccounts,
    locks: WalletLocks,
    settings: CoordinatorSettings,
}

impl TransactionCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        idempotency: Arc<dyn IdempotencyGuard>,
        wallets: Arc<dyn WalletStore>,
        alerts: Arc<dyn AlertSink>,
        system: SystemAccounts,
    ) -> Self {
        Self {
            ledger,
            idempotency,
            wallets,
            alerts,
            system,
            locks: WalletLocks::new(),
            settings: CoordinatorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn system_accounts(&self) -> &SystemAccounts {
        &self.system
    }

    // =========================================================================
    // Wallet access
    // =========================================================================

    /// Create and persist an empty wallet
    pub async fn open_wallet(
        &self,
        owner_id: Uuid,
        chain_address: Option<String>,
    ) -> LedgerResult<Wallet> {
        let wallet = match chain_address {
            Some(address) => Wallet::for_address(owner_id, address),
            None => Wallet::new(owner_id),
        };
        self.wallets.save(&wallet).await?;

        tracing::info!(wallet_id = %wallet.id(), owner_id = %owner_id, "Wallet opened");
        Ok(wallet)
    }

    pub async fn load_wallet(&self, wallet_id: Uuid) -> LedgerResult<Wallet> {
        self.wallets
            .find_by_id(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))
    }

    /// Ledger-computed balance; ignores the cache
    pub async fn authoritative_balance(
        &self,
        wallet: &Wallet,
        currency: &Currency,
    ) -> LedgerResult<Amount> {
        match wallet.asset_account(currency) {
            Some(asset) => Ok(self.ledger.calculate_balance(&asset, currency).await?),
            None => Ok(Amount::zero(currency.clone())),
        }
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// External funds arrive: Dr wallet asset / Cr system liability
    pub async fn execute_deposit(
        &self,
        ctx: &OperationContext,
        wallet: &Wallet,
        currency: &Currency,
        amount: Amount,
        idempotency_key: &str,
        metadata: EntryMetadata,
    ) -> LedgerResult<ExecutionReceipt> {
        let request = OperationRequest {
            wallet_id: wallet.id(),
            currency,
            amount,
            key: idempotency_key,
            metadata,
            intent: FinancialIntent::Deposit,
        };
        self.execute(ctx, request).await
    }

    /// Funds leave the platform: Dr system liability / Cr wallet asset
    pub async fn execute_withdrawal(
        &self,
        ctx: &OperationContext,
        wallet: &Wallet,
        currency: &Currency,
        amount: Amount,
        idempotency_key: &str,
        metadata: EntryMetadata,
    ) -> LedgerResult<ExecutionReceipt> {
        let request = OperationRequest {
            wallet_id: wallet.id(),
            currency,
            amount,
            key: idempotency_key,
            metadata,
            intent: FinancialIntent::Withdrawal,
        };
        self.execute(ctx, request).await
    }

    /// Match or tournament entry: Dr system revenue / Cr wallet asset
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_entry_fee(
        &self,
        ctx: &OperationContext,
        wallet: &Wallet,
        currency: &Currency,
        amount: Amount,
        match_id: Option<Uuid>,
        tournament_id: Option<Uuid>,
        idempotency_key: &str,
        metadata: EntryMetadata,
    ) -> LedgerResult<ExecutionReceipt> {
        let mut metadata = metadata;
        metadata.match_id = match_id.or(metadata.match_id);
        metadata.tournament_id = tournament_id.or(metadata.tournament_id);

        let request = OperationRequest {
            wallet_id: wallet.id(),
            currency,
            amount,
            key: idempotency_key,
            metadata,
            intent: FinancialIntent::EntryFee,
        };
        self.execute(ctx, request).await
    }

    /// Prize credit, capped per trailing window: Dr wallet asset / Cr system expense
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_prize_winning(
        &self,
        ctx: &OperationContext,
        wallet: &Wallet,
        currency: &Currency,
        amount: Amount,
        max_daily: Amount,
        idempotency_key: &str,
        metadata: EntryMetadata,
    ) -> LedgerResult<ExecutionReceipt> {
        let request = OperationRequest {
            wallet_id: wallet.id(),
            currency,
            amount,
            key: idempotency_key,
            metadata,
            intent: FinancialIntent::PrizeWinning { max_daily },
        };
        self.execute(ctx, request).await
    }

    /// Reverse (part of) an entry fee: Dr wallet asset / Cr system revenue
    pub async fn execute_refund(
        &self,
        ctx: &OperationContext,
        wallet: &Wallet,
        currency: &Currency,
        amount: Amount,
        idempotency_key: &str,
        metadata: EntryMetadata,
    ) -> LedgerResult<ExecutionReceipt> {
        let request = OperationRequest {
            wallet_id: wallet.id(),
            currency,
            amount,
            key: idempotency_key,
            metadata,
            intent: FinancialIntent::Refund,
        };
        self.execute(ctx, request).await
    }

    /// Split a prize pool by basis points and credit each winner.
    ///
    /// Each winner gets its own paired transaction keyed `"{key}:{wallet_id}"`,
    /// so a partially failed distribution can be resubmitted safely. Zero
    /// shares are skipped.
    pub async fn execute_prize_distribution(
        &self,
        ctx: &OperationContext,
        pool: Amount,
        shares_bps: &[(Uuid, u32)],
        max_daily: Amount,
        idempotency_key: &str,
        metadata: EntryMetadata,
    ) -> LedgerResult<PrizeDistributionReport> {
        let bps: Vec<u32> = shares_bps.iter().map(|(_, share)| *share).collect();
        let parts = pool.split_bps(&bps)?;
        let currency = pool.currency().clone();

        let mut report = PrizeDistributionReport::default();
        for ((wallet_id, _), amount) in shares_bps.iter().zip(parts) {
            if amount.is_zero() {
                tracing::debug!(wallet_id = %wallet_id, "Skipping zero prize share");
                continue;
            }

            let key = format!("{}:{}", idempotency_key, wallet_id);
            let request = OperationRequest {
                wallet_id: *wallet_id,
                currency: &currency,
                amount: amount.clone(),
                key: &key,
                metadata: metadata.clone(),
                intent: FinancialIntent::PrizeWinning {
                    max_daily: max_daily.clone(),
                },
            };
            let outcome = self.execute(ctx, request).await;
            if let Err(e) = &outcome {
                tracing::warn!(wallet_id = %wallet_id, error = %e, "Prize payout failed");
            }

            report.payouts.push(PrizePayout {
                wallet_id: *wallet_id,
                amount,
                outcome,
            });
        }

        tracing::info!(
            paid = report.succeeded(),
            total = report.payouts.len(),
            "Prize distribution finished"
        );
        Ok(report)
    }

    /// Overwrite the wallet cache with ledger-computed balances
    pub async fn resync_cached_balances(
        &self,
        ctx: &OperationContext,
        wallet_id: Uuid,
    ) -> LedgerResult<Vec<BalanceCorrection>> {
        let _guard = self.lock(ctx, wallet_id).await?;
        let mut wallet = self.load_wallet(wallet_id).await?;

        let mut corrections = Vec::new();
        for currency in wallet.currencies() {
            let computed = self.authoritative_balance(&wallet, &currency).await?;
            let cached = wallet.get_balance(&currency);
            if cached != computed {
                corrections.push(BalanceCorrection {
                    currency: currency.clone(),
                    previous: cached,
                    corrected: computed.clone(),
                });
                wallet.set_cached_balance(computed);
            }
        }

        if !corrections.is_empty() {
            wallet.record_change();
            self.wallets.save(&wallet).await?;
            tracing::warn!(
                wallet_id = %wallet_id,
                corrections = corrections.len(),
                "Wallet cache resynced from ledger"
            );
        }

        Ok(corrections)
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    async fn execute(
        &self,
        ctx: &OperationContext,
        request: OperationRequest<'_>,
    ) -> LedgerResult<ExecutionReceipt> {
        let operation = request.intent.operation();
        validate_request(&request)?;
        let request_hash = compute_request_hash(request.wallet_id, operation, &request.amount);

        tracing::debug!(
            wallet_id = %request.wallet_id,
            operation = %operation,
            amount = %request.amount,
            key = request.key,
            "Executing ledger operation"
        );

        // Step 1: idempotency read-check. A binding without entries belongs to
        // a commit still in flight; it is re-read under the lock.
        if let Some(existing) = self.idempotency.find(request.key).await? {
            if let Some(receipt) = self.settled_replay(&existing, &request_hash, request.wallet_id).await? {
                return Ok(receipt);
            }
        }
        if ctx.is_expired() {
            return Err(LedgerError::Cancelled);
        }

        // Step 2: wallet lock
        let wallet_guard = self.lock(ctx, request.wallet_id).await?;

        // Same-wallet duplicates serialize on the lock and land here
        if let Some(existing) = self.idempotency.find(request.key).await? {
            return self
                .settled_replay(&existing, &request_hash, request.wallet_id)
                .await?
                .ok_or_else(|| unsettled(&existing));
        }

        let mut wallet = self.load_wallet(request.wallet_id).await?;
        self.validate(&wallet, &request).await?;

        // Step 3: build the posting pair
        let (asset, account_created) = wallet.ensure_asset_account(request.currency);
        let (debit, credit) = request.intent.postings(&asset, &self.system);
        let mut metadata = request.metadata;
        metadata.correlation_id = metadata.correlation_id.or(ctx.correlation_id);
        metadata.initiated_by = metadata.initiated_by.or(ctx.initiated_by);
        let transaction = Transaction::pair(operation, &debit, &credit, request.amount, metadata)?;

        // Last point at which the caller's deadline can still abort cleanly
        if ctx.is_expired() {
            return Err(LedgerError::Cancelled);
        }

        let prepared = PreparedCommit {
            context: ctx.clone(),
            wallet,
            asset,
            account_created,
            transaction,
            key: request.key.to_string(),
            request_hash,
        };

        // Steps 4-5
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let _held = wallet_guard;
            this.commit(prepared).await
        });

        handle
            .await
            .map_err(|e| LedgerError::Internal(format!("commit task failed: {}", e)))?
    }

    async fn lock(&self, ctx: &OperationContext, id: Uuid) -> LedgerResult<OwnedMutexGuard<()>> {
        let (wait, bounded_by_deadline) = match ctx.remaining() {
            Some(left) if left.is_zero() => return Err(LedgerError::Cancelled),
            Some(left) if left < self.settings.lock_timeout => (left, true),
            _ => (self.settings.lock_timeout, false),
        };

        match self.locks.acquire(id, wait).await {
            Some(guard) => Ok(guard),
            None if bounded_by_deadline => Err(LedgerError::Cancelled),
            None => {
                tracing::warn!(resource = %id, waited_ms = wait.as_millis() as u64, "Lock wait timed out");
                Err(LedgerError::LockTimeout {
                    resource: id,
                    waited_ms: wait.as_millis() as u64,
                })
            }
        }
    }

    /// Replay `existing` only when its transaction is durably in the ledger
    async fn settled_replay(
        &self,
        existing: &IdempotencyRecord,
        request_hash: &str,
        wallet_id: Uuid,
    ) -> LedgerResult<Option<ExecutionReceipt>> {
        let entries = self
            .ledger
            .find_by_transaction_id(existing.transaction_id)
            .await?;
        if !derive_status(&entries).is_balanced() {
            tracing::debug!(
                key = %existing.key,
                transaction_id = %existing.transaction_id,
                entries = entries.len(),
                "Idempotency key bound to an unsettled transaction"
            );
            return Ok(None);
        }
        Ok(Some(self.replay(existing, request_hash, wallet_id)))
    }

    fn replay(
        &self,
        existing: &IdempotencyRecord,
        request_hash: &str,
        wallet_id: Uuid,
    ) -> ExecutionReceipt {
        if existing.request_hash != request_hash {
            tracing::warn!(
                key = %existing.key,
                wallet_id = %wallet_id,
                transaction_id = %existing.transaction_id,
                "Idempotency key reused with a different request; returning original transaction"
            );
        } else {
            tracing::info!(
                key = %existing.key,
                transaction_id = %existing.transaction_id,
                "Idempotent replay"
            );
        }
        ExecutionReceipt::replayed(existing.transaction_id)
    }

    // =========================================================================
    // Business rules (always against the ledger, never the cache)
    // =========================================================================

    async fn validate(&self, wallet: &Wallet, request: &OperationRequest<'_>) -> LedgerResult<()> {
        let currency = request.currency;
        let amount = &request.amount;

        if request.intent.debits_wallet() {
            let available = self.authoritative_balance(wallet, currency).await?;
            if available.try_cmp(amount)?.is_lt() {
                return Err(LedgerError::InsufficientBalance {
                    required: amount.clone(),
                    available,
                });
            }
            return Ok(());
        }

        match &request.intent {
            FinancialIntent::PrizeWinning { max_daily } => {
                self.check_prize_cap(wallet, currency, amount, max_daily).await
            }
            FinancialIntent::Refund => {
                // Unlocked read; the refund_of cap below is the per-wallet bound
                let revenue = self.system.revenue();
                let available = self.ledger.calculate_balance(&revenue, currency).await?;
                if available.try_cmp(amount)?.is_lt() {
                    return Err(LedgerError::InsufficientBalance {
                        required: amount.clone(),
                        available,
                    });
                }
                if let Some(original) = request.metadata.refund_of {
                    self.check_refund_source(wallet, currency, amount, original)
                        .await?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn check_prize_cap(
        &self,
        wallet: &Wallet,
        currency: &Currency,
        amount: &Amount,
        max_daily: &Amount,
    ) -> LedgerResult<()> {
        max_daily.ensure_same_currency(amount)?;
        if max_daily.is_negative() {
            return Err(LedgerError::InvalidAmount(format!(
                "daily limit must not be negative (got {})",
                max_daily
            )));
        }

        let credited = match wallet.asset_account(currency) {
            Some(asset) => {
                let since = Utc::now() - self.settings.prize_window;
                self.ledger
                    .sum_postings_since(
                        &asset,
                        currency,
                        OperationType::PrizeWinning,
                        asset.account_type.increases_with(),
                        since,
                    )
                    .await?
            }
            None => Amount::zero(currency.clone()),
        };

        let total = credited.checked_add(amount)?;
        if total.try_cmp(max_daily)?.is_gt() {
            return Err(LedgerError::DailyLimitExceeded {
                limit: max_daily.clone(),
                credited,
                requested: amount.clone(),
            });
        }
        Ok(())
    }

    /// A refund must point at an entry fee this wallet paid, in this currency,
    /// and cumulative refunds must not exceed that fee
    async fn check_refund_source(
        &self,
        wallet: &Wallet,
        currency: &Currency,
        amount: &Amount,
        original: Uuid,
    ) -> LedgerResult<()> {
        let asset = wallet.asset_account(currency).ok_or_else(|| {
            LedgerError::InvalidReference(format!(
                "wallet {} never paid in {}",
                wallet.id(),
                currency
            ))
        })?;

        let entries = self.ledger.find_by_transaction_id(original).await?;
        let fee = entries
            .iter()
            .find(|e| {
                e.category == OperationType::EntryFee
                    && e.account_id == asset.id
                    && e.entry_type == EntryType::Credit
                    && e.currency() == currency
            })
            .ok_or_else(|| {
                LedgerError::InvalidReference(format!(
                    "transaction {} is not an entry fee paid by wallet {}",
                    original,
                    wallet.id()
                ))
            })?;

        let refunded = self.refunded_so_far(&asset, currency, original).await?;
        let total = refunded.checked_add(amount)?;
        if total.try_cmp(&fee.amount)?.is_gt() {
            return Err(LedgerError::InvalidReference(format!(
                "refunds of {} would total {}, exceeding the fee of {}",
                original, total, fee.amount
            )));
        }
        Ok(())
    }

    async fn refunded_so_far(
        &self,
        asset: &Account,
        currency: &Currency,
        original: Uuid,
    ) -> LedgerResult<Amount> {
        let mut total = Amount::zero(currency.clone());
        let mut offset = 0;
        loop {
            let page = self
                .ledger
                .find_by_account_id(asset.id, REFUND_SCAN_PAGE, offset)
                .await?;
            for entry in &page {
                if entry.category == OperationType::Refund
                    && entry.metadata.refund_of == Some(original)
                    && entry.currency() == currency
                {
                    total = total.checked_add(&entry.amount)?;
                }
            }
            if (page.len() as i64) < REFUND_SCAN_PAGE {
                return Ok(total);
            }
            offset += REFUND_SCAN_PAGE;
        }
    }

    // =========================================================================
    // Commit and compensation
    // =========================================================================

    async fn commit(&self, prepared: PreparedCommit) -> LedgerResult<ExecutionReceipt> {
        let PreparedCommit {
            context,
            mut wallet,
            asset,
            account_created,
            transaction,
            key,
            request_hash,
        } = prepared;
        let transaction_id = transaction.id;

        // (a) a newly allocated asset account must be durable before postings reference it
        if account_created {
            wallet.record_change();
            self.wallets.save(&wallet).await?;
            tracing::debug!(
                wallet_id = %wallet.id(),
                account_id = %asset.id,
                "Asset account allocated"
            );
        }

        // (b) claim the key
        let record = IdempotencyRecord::new(&key, transaction_id, request_hash.clone());
        match self.idempotency.insert_if_absent(&record).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::Existing(existing)) => {
                return self
                    .settled_replay(&existing, &request_hash, wallet.id())
                    .await?
                    .ok_or_else(|| unsettled(&existing));
            }
            Err(StoreError::DuplicateKey(_)) => {
                return match self.idempotency.find(&key).await? {
                    Some(existing) => self
                        .settled_replay(&existing, &request_hash, wallet.id())
                        .await?
                        .ok_or_else(|| unsettled(&existing)),
                    None => Err(LedgerError::IdempotencyConflict { key }),
                };
            }
            Err(e) => return Err(e.into()),
        }

        // (c) append
        if let Err(write_error) = self
            .ledger
            .append_entries(transaction_id, &transaction.entries)
            .await
        {
            return Err(self
                .compensate(&context, wallet.id(), &key, transaction_id, write_error)
                .await);
        }

        tracing::info!(
            transaction_id = %transaction_id,
            wallet_id = %wallet.id(),
            operation = %transaction.category,
            "Ledger transaction committed"
        );

        // Step 5: cache follows the ledger; failure here does not undo the commit
        let delta = transaction
            .entry_for(asset.id)
            .map(|entry| Amount::from_minor(entry.signed_minor(), entry.currency().clone()));
        let cache_synced = match delta {
            Some(delta) => match self.update_cache(&mut wallet, &delta).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(
                        wallet_id = %wallet.id(),
                        transaction_id = %transaction_id,
                        error = %e,
                        "Wallet cache update failed after commit; reconciliation required"
                    );
                    self.alerts
                        .raise(
                            LedgerAlertBuilder::new(AlertAction::CacheUpdateFailed)
                                .wallet(wallet.id())
                                .transaction(transaction_id)
                                .idempotency_key(&key)
                                .context(&context)
                                .detail("error", &e.to_string())
                                .build(),
                        )
                        .await;
                    false
                }
            },
            None => true,
        };

        Ok(ExecutionReceipt::committed(transaction_id, cache_synced))
    }

    async fn update_cache(&self, wallet: &mut Wallet, delta: &Amount) -> LedgerResult<()> {
        wallet.apply_cached_delta(delta)?;
        wallet.record_change();
        self.wallets.save(wallet).await?;
        Ok(())
    }

    /// Undo a failed append: delete, verify nothing remains, release the key
    async fn compensate(
        &self,
        ctx: &OperationContext,
        wallet_id: Uuid,
        key: &str,
        transaction_id: Uuid,
        write_error: StoreError,
    ) -> LedgerError {
        tracing::warn!(
            transaction_id = %transaction_id,
            wallet_id = %wallet_id,
            error = %write_error,
            "Ledger append failed, compensating"
        );

        let rollback: Result<(), StoreError> = async {
            let deleted = self.ledger.delete_transaction_entries(transaction_id).await?;
            let remaining = self.ledger.find_by_transaction_id(transaction_id).await?;
            if !remaining.is_empty() {
                return Err(StoreError::Corrupt(format!(
                    "{} entries remain after deleting {}",
                    remaining.len(),
                    deleted
                )));
            }
            self.idempotency.release(key, transaction_id).await?;
            Ok(())
        }
        .await;

        match rollback {
            Ok(()) => {
                tracing::info!(transaction_id = %transaction_id, "Compensation complete");
                LedgerError::LedgerWriteFailed {
                    transaction_id,
                    source: write_error,
                }
            }
            Err(rollback_error) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    wallet_id = %wallet_id,
                    write_error = %write_error,
                    rollback_error = %rollback_error,
                    "CRITICAL: rollback failed, manual intervention required"
                );
                self.alerts
                    .raise(
                        LedgerAlertBuilder::new(AlertAction::RollbackFailed)
                            .wallet(wallet_id)
                            .transaction(transaction_id)
                            .idempotency_key(key)
                            .context(ctx)
                            .detail("write_error", &write_error.to_string())
                            .detail("rollback_error", &rollback_error.to_string())
                            .build(),
                    )
                    .await;

                LedgerError::RollbackFailed {
                    transaction_id,
                    write_error: write_error.to_string(),
                    rollback_error: rollback_error.to_string(),
                }
            }
        }
    }
}

/// Key still bound to a transaction with no complete entries: retry later
fn unsettled(existing: &IdempotencyRecord) -> LedgerError {
    LedgerError::IdempotencyConflict {
        key: existing.key.clone(),
    }
}

/// Step 0: reject malformed requests before touching any store
fn validate_request(request: &OperationRequest<'_>) -> LedgerResult<()> {
    if request.key.trim().is_empty() {
        return Err(LedgerError::InvalidRequest(
            "idempotency key must not be empty".to_string(),
        ));
    }
    if request.amount.currency() != request.currency {
        return Err(LedgerError::CurrencyMismatch {
            expected: request.currency.clone(),
            found: request.amount.currency().clone(),
        });
    }
    if !request.amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive (got {})",
            request.amount
        )));
    }
    Ok(())
}
