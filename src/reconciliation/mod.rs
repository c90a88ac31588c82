//! Reconciliation module
//!
//! Recomputes wallet balances from the ledger and compares them with the
//! wallet cache. Read-only: drift is reported and escalated, never repaired
//! here (see `TransactionCoordinator::resync_cached_balances`).

mod service;

pub use service::{RecheckPolicy, ReconciliationService};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{AccountType, Amount, Currency, MoneyError, TransactionStatus};
use crate::ledger_store::AccountTotals;

/// Per-currency outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Matched,
    Mismatched,
}

/// How far a cached balance has drifted, by absolute minor units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancySeverity {
    /// under 1.00
    Low,
    /// under 100.00
    Medium,
    /// under 1000.00
    High,
    Critical,
}

impl DiscrepancySeverity {
    pub fn from_minor(discrepancy: i64) -> Self {
        match discrepancy.unsigned_abs() {
            0..=99 => DiscrepancySeverity::Low,
            100..=9_999 => DiscrepancySeverity::Medium,
            10_000..=99_999 => DiscrepancySeverity::High,
            _ => DiscrepancySeverity::Critical,
        }
    }

    pub fn needs_review(&self) -> bool {
        matches!(self, DiscrepancySeverity::High | DiscrepancySeverity::Critical)
    }
}

/// One wallet, one currency. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub wallet_id: Uuid,
    pub currency: Currency,
    pub cached_balance: Amount,
    pub computed_balance: Amount,
    pub status: ReconciliationStatus,
    /// cached minus computed
    pub discrepancy: Amount,
    pub severity: Option<DiscrepancySeverity>,
}

impl ReconciliationResult {
    pub(crate) fn compare(
        wallet_id: Uuid,
        cached_balance: Amount,
        computed_balance: Amount,
    ) -> Result<Self, crate::domain::MoneyError> {
        let discrepancy = cached_balance.checked_sub(&computed_balance)?;
        let (status, severity) = if discrepancy.is_zero() {
            (ReconciliationStatus::Matched, None)
        } else {
            (
                ReconciliationStatus::Mismatched,
                Some(DiscrepancySeverity::from_minor(discrepancy.minor())),
            )
        };

        Ok(Self {
            wallet_id,
            currency: computed_balance.currency().clone(),
            cached_balance,
            computed_balance,
            status,
            discrepancy,
            severity,
        })
    }

    pub fn is_matched(&self) -> bool {
        self.status == ReconciliationStatus::Matched
    }
}

/// Overall outcome for a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletReconciliationStatus {
    /// Every currency matched (or the wallet holds none)
    Matched,
    /// Some currencies drifted, all by small amounts
    PartialMatch,
    /// No currency matched
    Mismatched,
    /// Some currencies matched but at least one drifted by a High or Critical amount
    ManualReview,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletReconciliationReport {
    pub wallet_id: Uuid,
    pub status: WalletReconciliationStatus,
    pub results: Vec<ReconciliationResult>,
    pub checked_at: DateTime<Utc>,
}

impl WalletReconciliationReport {
    pub(crate) fn new(wallet_id: Uuid, results: Vec<ReconciliationResult>) -> Self {
        let status = overall_status(&results);
        Self {
            wallet_id,
            status,
            results,
            checked_at: Utc::now(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.status == WalletReconciliationStatus::Matched
    }

    pub fn mismatches(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.results.iter().filter(|r| !r.is_matched())
    }

    pub fn result_for(&self, currency: &Currency) -> Option<&ReconciliationResult> {
        self.results.iter().find(|r| &r.currency == currency)
    }

    pub fn max_severity(&self) -> Option<DiscrepancySeverity> {
        self.results.iter().filter_map(|r| r.severity).max()
    }
}

fn overall_status(results: &[ReconciliationResult]) -> WalletReconciliationStatus {
    let mismatched = results.iter().filter(|r| !r.is_matched()).count();
    if mismatched == 0 {
        return WalletReconciliationStatus::Matched;
    }
    if mismatched == results.len() {
        return WalletReconciliationStatus::Mismatched;
    }

    let needs_review = results
        .iter()
        .filter_map(|r| r.severity)
        .any(|s| s.needs_review());
    if needs_review {
        WalletReconciliationStatus::ManualReview
    } else {
        WalletReconciliationStatus::PartialMatch
    }
}

/// Result of a sweep over all wallets. Only drifted wallets are kept in full.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReconciliationReport {
    pub report_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub wallets_checked: usize,
    pub wallets_matched: usize,
    pub drifted: Vec<WalletReconciliationReport>,
    /// Wallets that could not be reconciled, with the error text
    pub failed: Vec<(Uuid, String)>,
}

impl BatchReconciliationReport {
    pub(crate) fn start() -> Self {
        let now = Utc::now();
        Self {
            report_id: Uuid::new_v4(),
            started_at: now,
            completed_at: now,
            wallets_checked: 0,
            wallets_matched: 0,
            drifted: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.failed.is_empty()
    }
}

/// Integrity of a single ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionIntegrity {
    pub transaction_id: Uuid,
    pub status: TransactionStatus,
    pub entry_count: usize,
}

/// One account's closing balance, on the side it nets to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalanceLine {
    pub account_id: Uuid,
    pub account_type: AccountType,
    pub debit_balance: Amount,
    pub credit_balance: Amount,
}

/// Ledger-wide check that total debits equal total credits in one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    pub currency: Currency,
    pub lines: Vec<TrialBalanceLine>,
    pub total_debits: Amount,
    pub total_credits: Amount,
    pub generated_at: DateTime<Utc>,
}

impl TrialBalance {
    pub(crate) fn from_totals(currency: &Currency, totals: &[AccountTotals]) -> Result<Self, MoneyError> {
        let zero = Amount::zero(currency.clone());
        let mut lines = Vec::with_capacity(totals.len());
        let mut total_debits = zero.clone();
        let mut total_credits = zero.clone();

        for account in totals {
            let net = account.debits.checked_sub(&account.credits)?;
            let (debit_balance, credit_balance) = if net.is_negative() {
                (zero.clone(), net.negate()?)
            } else {
                (net, zero.clone())
            };
            total_debits = total_debits.checked_add(&debit_balance)?;
            total_credits = total_credits.checked_add(&credit_balance)?;
            lines.push(TrialBalanceLine {
                account_id: account.account_id,
                account_type: account.account_type,
                debit_balance,
                credit_balance,
            });
        }

        Ok(Self {
            currency: currency.clone(),
            lines,
            total_debits,
            total_credits,
            generated_at: Utc::now(),
        })
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits == self.total_credits
    }

    /// Total debits minus total credits
    pub fn difference(&self) -> Result<Amount, MoneyError> {
        self.total_debits.checked_sub(&self.total_credits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(minor: i64) -> Amount {
        Amount::from_minor(minor, Currency::new("USD").unwrap())
    }

    fn eur(minor: i64) -> Amount {
        Amount::from_minor(minor, Currency::new("EUR").unwrap())
    }

    #[test]
    fn test_severity_thresholds() {
        assert_eq!(DiscrepancySeverity::from_minor(1), DiscrepancySeverity::Low);
        assert_eq!(DiscrepancySeverity::from_minor(-99), DiscrepancySeverity::Low);
        assert_eq!(DiscrepancySeverity::from_minor(100), DiscrepancySeverity::Medium);
        assert_eq!(DiscrepancySeverity::from_minor(9_999), DiscrepancySeverity::Medium);
        assert_eq!(DiscrepancySeverity::from_minor(-10_000), DiscrepancySeverity::High);
        assert_eq!(DiscrepancySeverity::from_minor(100_000), DiscrepancySeverity::Critical);
        assert_eq!(DiscrepancySeverity::from_minor(i64::MIN), DiscrepancySeverity::Critical);
    }

    #[test]
    fn test_discrepancy_is_cached_minus_computed() {
        let result = ReconciliationResult::compare(Uuid::new_v4(), usd(7000), usd(10000)).unwrap();
        assert_eq!(result.status, ReconciliationStatus::Mismatched);
        assert_eq!(result.discrepancy.minor(), -3000);
        assert_eq!(result.severity, Some(DiscrepancySeverity::Medium));

        let result = ReconciliationResult::compare(Uuid::new_v4(), usd(500), usd(500)).unwrap();
        assert!(result.is_matched());
        assert!(result.severity.is_none());
    }

    #[test]
    fn test_overall_status() {
        let wallet = Uuid::new_v4();
        let matched = ReconciliationResult::compare(wallet, usd(100), usd(100)).unwrap();
        let small = ReconciliationResult::compare(wallet, eur(150), eur(100)).unwrap();
        let large = ReconciliationResult::compare(wallet, eur(50_000), eur(0)).unwrap();

        assert_eq!(
            WalletReconciliationReport::new(wallet, vec![]).status,
            WalletReconciliationStatus::Matched
        );
        assert_eq!(
            WalletReconciliationReport::new(wallet, vec![matched.clone(), small.clone()]).status,
            WalletReconciliationStatus::PartialMatch
        );
        assert_eq!(
            WalletReconciliationReport::new(wallet, vec![matched, large.clone()]).status,
            WalletReconciliationStatus::ManualReview
        );

        let report = WalletReconciliationReport::new(wallet, vec![large]);
        assert_eq!(report.status, WalletReconciliationStatus::Mismatched);
        assert_eq!(report.max_severity(), Some(DiscrepancySeverity::High));
    }

    #[test]
    fn test_trial_balance_nets_each_account() {
        let totals = |account_type, debits, credits| AccountTotals {
            account_id: Uuid::new_v4(),
            account_type,
            debits: usd(debits),
            credits: usd(credits),
        };
        let currency = Currency::new("USD").unwrap();

        let balanced = TrialBalance::from_totals(
            &currency,
            &[
                totals(AccountType::Asset, 10000, 3000),
                totals(AccountType::Liability, 3000, 10000),
            ],
        )
        .unwrap();
        assert!(balanced.is_balanced());
        assert_eq!(balanced.total_debits.minor(), 7000);
        assert_eq!(balanced.lines[1].credit_balance.minor(), 7000);
        assert!(balanced.lines[1].debit_balance.is_zero());

        let lopsided = TrialBalance::from_totals(
            &currency,
            &[totals(AccountType::Liability, 3000, 0)],
        )
        .unwrap();
        assert!(!lopsided.is_balanced());
        assert_eq!(lopsided.difference().unwrap().minor(), 3000);
    }
}
