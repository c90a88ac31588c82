//! Scheduled Jobs
//!
//! Background reconciliation sweep. Each run reconciles every wallet, then
//! re-checks the drifted ones so only persistent drift is escalated.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::reconciliation::{RecheckPolicy, ReconciliationService};

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for the reconciliation scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Interval between sweeps (default: 5 minutes)
    pub interval: Duration,
    /// Wallet ids fetched per page (default: 500)
    pub page_size: i64,
    /// Re-reads applied to drifted wallets before alerting
    pub recheck: RecheckPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            page_size: 500,
            recheck: RecheckPolicy::default(),
        }
    }
}

/// Runs the reconciliation sweep on a fixed interval
pub struct ReconciliationScheduler {
    service: ReconciliationService,
    config: SchedulerConfig,
}

impl ReconciliationScheduler {
    pub fn new(service: ReconciliationService) -> Self {
        Self {
            service,
            config: SchedulerConfig::default(),
        }
    }

    pub fn with_config(service: ReconciliationService, config: SchedulerConfig) -> Self {
        Self { service, config }
    }

    /// Start the scheduler in the background.
    /// Returns a handle that can be used to abort it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            page_size = self.config.page_size,
            "Reconciliation scheduler started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(summary) if summary.persistent_drift.is_empty() => {
                    tracing::debug!(checked = summary.wallets_checked, "Reconciliation sweep clean");
                }
                Ok(summary) => {
                    tracing::warn!(
                        checked = summary.wallets_checked,
                        persistent = summary.persistent_drift.len(),
                        "Reconciliation sweep found persistent drift"
                    );
                }
                Err(e) => tracing::error!(error = %e, "Reconciliation sweep failed"),
            }
        }
    }

    /// One sweep plus re-checks (for manual trigger or testing)
    pub async fn run_once(&self) -> Result<SweepSummary, JobError> {
        let batch = self.service.reconcile_all(self.config.page_size).await?;

        let mut summary = SweepSummary {
            report_id: batch.report_id,
            wallets_checked: batch.wallets_checked,
            wallets_matched: batch.wallets_matched,
            transient_drift: 0,
            persistent_drift: Vec::new(),
            errors: batch
                .failed
                .iter()
                .map(|(id, e)| format!("{}: {}", id, e))
                .collect(),
            completed_at: Utc::now(),
        };

        for drifted in &batch.drifted {
            match self
                .service
                .reconcile_with_recheck(drifted.wallet_id, self.config.recheck)
                .await
            {
                Ok(report) if report.is_matched() => summary.transient_drift += 1,
                Ok(report) => summary.persistent_drift.push(report.wallet_id),
                Err(e) => summary.errors.push(format!("{}: {}", drifted.wallet_id, e)),
            }
        }

        summary.completed_at = Utc::now();
        Ok(summary)
    }
}

/// Report from one sweep
#[derive(Debug, Clone)]
pub struct SweepSummary {
    pub report_id: Uuid,
    pub wallets_checked: usize,
    pub wallets_matched: usize,
    /// Mismatches that cleared on re-read
    pub transient_drift: usize,
    pub persistent_drift: Vec<Uuid>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Reconciliation error: {0}")]
    Reconciliation(#[from] LedgerError),
}

// =========================================================================
// Tests
// =========================================================================
