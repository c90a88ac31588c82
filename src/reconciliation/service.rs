//! Reconciliation Service
//!
//! Safe to run alongside live coordinator traffic. A wallet caught
//! mid-transaction can show a transient mismatch, so single mismatches are
//! re-read before anything is escalated.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::alert::{AlertAction, AlertSink, LedgerAlertBuilder};
use crate::domain::{derive_status, Amount, Currency, Wallet};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger_store::LedgerStore;
use crate::wallet_store::WalletStore;

use super::{
    BatchReconciliationReport, ReconciliationResult, TransactionIntegrity, TrialBalance,
    WalletReconciliationReport,
};

/// How hard to look at a mismatch before calling it drift
#[derive(Debug, Clone, Copy)]
pub struct RecheckPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RecheckPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone)]
pub struct ReconciliationService {
    ledger: Arc<dyn LedgerStore>,
    wallets: Arc<dyn WalletStore>,
    alerts: Arc<dyn AlertSink>,
}

impl ReconciliationService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        wallets: Arc<dyn WalletStore>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            ledger,
            wallets,
            alerts,
        }
    }

    // =========================================================================
    // Wallet reconciliation
    // =========================================================================

    /// Compare the cache with ledger-computed balances for every currency the
    /// wallet knows about
    pub async fn reconcile_wallet(&self, wallet_id: Uuid) -> LedgerResult<WalletReconciliationReport> {
        let wallet = self
            .wallets
            .find_by_id(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;

        let mut results = Vec::new();
        for currency in wallet.currencies() {
            let computed = self.computed_balance(&wallet, &currency).await?;
            let cached = wallet.get_balance(&currency);
            results.push(ReconciliationResult::compare(wallet_id, cached, computed)?);
        }

        let report = WalletReconciliationReport::new(wallet_id, results);
        if report.is_matched() {
            tracing::debug!(
                wallet_id = %wallet_id,
                currencies = report.results.len(),
                "Wallet reconciled: all balances match"
            );
        } else {
            for result in report.mismatches() {
                tracing::warn!(
                    wallet_id = %wallet_id,
                    currency = %result.currency,
                    cached = %result.cached_balance,
                    computed = %result.computed_balance,
                    discrepancy = %result.discrepancy,
                    severity = ?result.severity,
                    "Wallet balance mismatch"
                );
            }
        }

        Ok(report)
    }

    /// Reconcile, and re-read while mismatched. Drift that survives every
    /// re-read is raised on the alert sink.
    pub async fn reconcile_with_recheck(
        &self,
        wallet_id: Uuid,
        policy: RecheckPolicy,
    ) -> LedgerResult<WalletReconciliationReport> {
        let mut report = self.reconcile_wallet(wallet_id).await?;

        for attempt in 1..=policy.attempts {
            if report.is_matched() {
                return Ok(report);
            }
            tracing::debug!(
                wallet_id = %wallet_id,
                attempt = attempt,
                "Mismatch observed, re-checking"
            );
            tokio::time::sleep(policy.delay).await;
            report = self.reconcile_wallet(wallet_id).await?;
        }

        if !report.is_matched() {
            let mismatches: Vec<&ReconciliationResult> = report.mismatches().collect();
            tracing::error!(
                wallet_id = %wallet_id,
                status = ?report.status,
                mismatched = mismatches.len(),
                "Persistent balance drift detected"
            );
            self.alerts
                .raise(
                    LedgerAlertBuilder::new(AlertAction::PersistentDrift)
                        .wallet(wallet_id)
                        .detail("status", &report.status)
                        .detail("rechecks", &policy.attempts)
                        .detail("mismatches", &mismatches)
                        .build(),
                )
                .await;
        }

        Ok(report)
    }

    /// Sweep every wallet, `page_size` ids at a time. Per-wallet failures are
    /// collected rather than aborting the sweep.
    pub async fn reconcile_all(&self, page_size: i64) -> LedgerResult<BatchReconciliationReport> {
        if page_size <= 0 {
            return Err(LedgerError::InvalidRequest(format!(
                "page size must be positive (got {})",
                page_size
            )));
        }

        let mut report = BatchReconciliationReport::start();
        let mut offset = 0;
        loop {
            let ids = self.wallets.list_ids(page_size, offset).await?;
            for wallet_id in &ids {
                report.wallets_checked += 1;
                match self.reconcile_wallet(*wallet_id).await {
                    Ok(wallet_report) if wallet_report.is_matched() => report.wallets_matched += 1,
                    Ok(wallet_report) => report.drifted.push(wallet_report),
                    Err(e) => {
                        tracing::error!(wallet_id = %wallet_id, error = %e, "Wallet reconciliation failed");
                        report.failed.push((*wallet_id, e.to_string()));
                    }
                }
            }
            if (ids.len() as i64) < page_size {
                break;
            }
            offset += page_size;
        }

        report.completed_at = chrono::Utc::now();
        tracing::info!(
            report_id = %report.report_id,
            checked = report.wallets_checked,
            matched = report.wallets_matched,
            drifted = report.drifted.len(),
            failed = report.failed.len(),
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    // =========================================================================
    // Ledger integrity
    // =========================================================================

    /// Check that a transaction's entries balance per currency
    pub async fn verify_transaction(&self, transaction_id: Uuid) -> LedgerResult<TransactionIntegrity> {
        let entries = self.ledger.find_by_transaction_id(transaction_id).await?;
        let status = derive_status(&entries);
        if !status.is_balanced() {
            tracing::warn!(
                transaction_id = %transaction_id,
                status = ?status,
                entries = entries.len(),
                "Transaction is not balanced"
            );
        }

        Ok(TransactionIntegrity {
            transaction_id,
            status,
            entry_count: entries.len(),
        })
    }

    /// Net every account in `currency` and check that total debits equal
    /// total credits across the whole ledger
    pub async fn trial_balance(&self, currency: &Currency) -> LedgerResult<TrialBalance> {
        let totals = self.ledger.account_totals(currency).await?;
        let trial = TrialBalance::from_totals(currency, &totals)?;

        if trial.is_balanced() {
            tracing::info!(
                currency = %currency,
                accounts = trial.lines.len(),
                total = %trial.total_debits,
                "Trial balance generated"
            );
        } else {
            tracing::error!(
                currency = %currency,
                total_debits = %trial.total_debits,
                total_credits = %trial.total_credits,
                "Trial balance does not balance"
            );
        }
        Ok(trial)
    }

    async fn computed_balance(&self, wallet: &Wallet, currency: &Currency) -> LedgerResult<Amount> {
        match wallet.asset_account(currency) {
            Some(asset) => Ok(self.ledger.calculate_balance(&asset, currency).await?),
            None => Ok(Amount::zero(currency.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::RecordingAlertSink;
    use crate::domain::{EntryMetadata, OperationContext, SystemAccounts, TransactionStatus};
    use crate::coordinator::TransactionCoordinator;
    use crate::idempotency::InMemoryIdempotencyGuard;
    use crate::ledger_store::{FaultPlan, InMemoryLedgerStore};
    use crate::reconciliation::{DiscrepancySeverity, WalletReconciliationStatus};
    use crate::wallet_store::InMemoryWalletStore;

    struct Fixture {
        ledger: Arc<InMemoryLedgerStore>,
        coordinator: TransactionCoordinator,
        service: ReconciliationService,
        wallets: Arc<InMemoryWalletStore>,
        alerts: Arc<RecordingAlertSink>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let wallets = Arc::new(InMemoryWalletStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let system = SystemAccounts::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let coordinator = TransactionCoordinator::new(
            ledger.clone(),
            Arc::new(InMemoryIdempotencyGuard::new()),
            wallets.clone(),
            alerts.clone(),
            system,
        );
        let service = ReconciliationService::new(ledger.clone(), wallets.clone(), alerts.clone());
        Fixture {
            ledger,
            coordinator,
            service,
            wallets,
            alerts,
        }
    }

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    async fn funded_wallet(fx: &Fixture, minor: i64) -> Wallet {
        let ctx = OperationContext::new();
        let wallet = fx.coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        fx.coordinator
            .execute_deposit(
                &ctx,
                &wallet,
                &usd(),
                Amount::from_minor(minor, usd()),
                &format!("fund-{}", wallet.id()),
                EntryMetadata::new(),
            )
            .await
            .unwrap();
        fx.coordinator.load_wallet(wallet.id()).await.unwrap()
    }

    /// Write a cache value that disagrees with the ledger
    async fn corrupt_cache(fx: &Fixture, wallet_id: Uuid, minor: i64) {
        let mut wallet = fx.coordinator.load_wallet(wallet_id).await.unwrap();
        wallet.set_cached_balance(Amount::from_minor(minor, usd()));
        wallet.record_change();
        fx.wallets.save(&wallet).await.unwrap();
    }

    #[tokio::test]
    async fn test_matched_after_clean_operations() {
        let fx = fixture();
        let wallet = funded_wallet(&fx, 10000).await;

        let report = fx.service.reconcile_wallet(wallet.id()).await.unwrap();
        assert_eq!(report.status, WalletReconciliationStatus::Matched);
        let usd_result = report.result_for(&usd()).unwrap();
        assert_eq!(usd_result.computed_balance.minor(), 10000);
        assert_eq!(usd_result.cached_balance.minor(), 10000);
    }

    #[tokio::test]
    async fn test_detects_drift_without_repairing() {
        let fx = fixture();
        let wallet = funded_wallet(&fx, 10000).await;
        corrupt_cache(&fx, wallet.id(), 12500).await;

        let report = fx.service.reconcile_wallet(wallet.id()).await.unwrap();
        assert_eq!(report.status, WalletReconciliationStatus::Mismatched);
        let result = report.result_for(&usd()).unwrap();
        assert_eq!(result.discrepancy.minor(), 2500);
        assert_eq!(result.severity, Some(DiscrepancySeverity::Medium));

        // read-only
        let reloaded = fx.coordinator.load_wallet(wallet.id()).await.unwrap();
        assert_eq!(reloaded.get_balance(&usd()).minor(), 12500);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let fx = fixture();
        let err = fx.service.reconcile_wallet(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::WalletNotFound(_)));
    }

    #[tokio::test]
    async fn test_persistent_drift_raises_alert() {
        let fx = fixture();
        let wallet = funded_wallet(&fx, 10000).await;
        corrupt_cache(&fx, wallet.id(), 0).await;

        let policy = RecheckPolicy {
            attempts: 2,
            delay: Duration::from_millis(1),
        };
        let report = fx
            .service
            .reconcile_with_recheck(wallet.id(), policy)
            .await
            .unwrap();

        assert!(!report.is_matched());
        assert_eq!(fx.alerts.count(AlertAction::PersistentDrift), 1);
    }

    #[tokio::test]
    async fn test_recheck_is_quiet_when_matched() {
        let fx = fixture();
        let wallet = funded_wallet(&fx, 500).await;

        let report = fx
            .service
            .reconcile_with_recheck(wallet.id(), RecheckPolicy::default())
            .await
            .unwrap();
        assert!(report.is_matched());
        assert!(fx.alerts.alerts().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_all_pages_through_wallets() {
        let fx = fixture();
        let mut ids = Vec::new();
        for minor in [100, 200, 300, 400, 500] {
            ids.push(funded_wallet(&fx, minor).await.id());
        }
        corrupt_cache(&fx, ids[2], 1).await;

        let report = fx.service.reconcile_all(2).await.unwrap();
        assert_eq!(report.wallets_checked, 5);
        assert_eq!(report.wallets_matched, 4);
        assert_eq!(report.drifted.len(), 1);
        assert_eq!(report.drifted[0].wallet_id, ids[2]);
        assert!(report.failed.is_empty());

        assert!(fx.service.reconcile_all(0).await.is_err());
    }

    #[tokio::test]
    async fn test_verify_transaction() {
        let fx = fixture();
        let ctx = OperationContext::new();
        let wallet = fx.coordinator.open_wallet(Uuid::new_v4(), None).await.unwrap();
        let receipt = fx
            .coordinator
            .execute_deposit(
                &ctx,
                &wallet,
                &usd(),
                Amount::from_minor(2500, usd()),
                "verify-1",
                EntryMetadata::new(),
            )
            .await
            .unwrap();

        let integrity = fx.service.verify_transaction(receipt.transaction_id).await.unwrap();
        assert_eq!(integrity.status, TransactionStatus::Balanced);
        assert_eq!(integrity.entry_count, 2);

        let missing = fx.service.verify_transaction(Uuid::new_v4()).await.unwrap();
        assert_eq!(missing.status, TransactionStatus::Missing);
    }

    #[tokio::test]
    async fn test_trial_balance_flags_orphaned_entry() {
        let fx = fixture();
        let ctx = OperationContext::new();
        let wallet = funded_wallet(&fx, 10000).await;
        fx.coordinator
            .execute_entry_fee(
                &ctx,
                &wallet,
                &usd(),
                Amount::from_minor(1500, usd()),
                None,
                None,
                "fee-tb",
                EntryMetadata::new(),
            )
            .await
            .unwrap();

        let trial = fx.service.trial_balance(&usd()).await.unwrap();
        assert!(trial.is_balanced());
        assert_eq!(trial.lines.len(), 3);
        assert_eq!(trial.total_debits.minor(), 10000);

        // Half a withdrawal survives a failed compensation
        fx.ledger
            .inject(FaultPlan::fail_append_after(1).and_fail_deletes());
        let err = fx
            .coordinator
            .execute_withdrawal(
                &ctx,
                &wallet,
                &usd(),
                Amount::from_minor(2000, usd()),
                "wd-orphan",
                EntryMetadata::new(),
            )
            .await
            .unwrap_err();
        fx.ledger.clear_faults();
        assert!(err.requires_operator_attention());

        let trial = fx.service.trial_balance(&usd()).await.unwrap();
        assert!(!trial.is_balanced());
        assert_eq!(trial.difference().unwrap().minor().abs(), 2000);

        let eur = Currency::new("EUR").unwrap();
        let empty = fx.service.trial_balance(&eur).await.unwrap();
        assert!(empty.is_balanced());
        assert!(empty.lines.is_empty());
    }
}
