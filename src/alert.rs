//! Operator alerts
//!
//! Conditions a human has to look at: a failed compensation that left the
//! ledger inconsistent, a wallet cache that could not be saved after commit,
//! or drift that survives reconciliation rechecks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::OperationContext;

/// Alert action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertAction {
    RollbackFailed,
    CacheUpdateFailed,
    PersistentDrift,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::RollbackFailed => "ledger.rollback_failed",
            AlertAction::CacheUpdateFailed => "wallet.cache_update_failed",
            AlertAction::PersistentDrift => "reconciliation.persistent_drift",
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertAction::RollbackFailed => AlertSeverity::Critical,
            AlertAction::CacheUpdateFailed | AlertAction::PersistentDrift => AlertSeverity::Warning,
        }
    }
}

impl std::fmt::Display for AlertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAlert {
    pub id: Uuid,
    pub action: AlertAction,
    pub severity: AlertSeverity,
    pub wallet_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Builder for alerts
#[derive(Debug, Clone)]
pub struct LedgerAlertBuilder {
    action: AlertAction,
    wallet_id: Option<Uuid>,
    transaction_id: Option<Uuid>,
    idempotency_key: Option<String>,
    correlation_id: Option<Uuid>,
    details: serde_json::Map<String, serde_json::Value>,
}

impl LedgerAlertBuilder {
    pub fn new(action: AlertAction) -> Self {
        Self {
            action,
            wallet_id: None,
            transaction_id: None,
            idempotency_key: None,
            correlation_id: None,
            details: serde_json::Map::new(),
        }
    }

    pub fn wallet(mut self, wallet_id: Uuid) -> Self {
        self.wallet_id = Some(wallet_id);
        self
    }

    pub fn transaction(mut self, transaction_id: Uuid) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn idempotency_key(mut self, key: &str) -> Self {
        self.idempotency_key = Some(key.to_string());
        self
    }

    pub fn context(mut self, context: &OperationContext) -> Self {
        self.correlation_id = context.correlation_id;
        self
    }

    /// Attach a detail field; values that fail to serialize are dropped
    pub fn detail<T: Serialize>(mut self, key: &str, value: &T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.details.insert(key.to_string(), value);
        }
        self
    }

    pub fn build(self) -> LedgerAlert {
        LedgerAlert {
            id: Uuid::new_v4(),
            action: self.action,
            severity: self.action.severity(),
            wallet_id: self.wallet_id,
            transaction_id: self.transaction_id,
            idempotency_key: self.idempotency_key,
            correlation_id: self.correlation_id,
            details: serde_json::Value::Object(self.details),
            created_at: Utc::now(),
        }
    }
}

/// Destination for operator alerts (pager, queue, log pipeline)
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: LedgerAlert);
}

/// Emits alerts as structured log events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn raise(&self, alert: LedgerAlert) {
        let wallet_id = alert.wallet_id.map(|id| id.to_string()).unwrap_or_default();
        let transaction_id = alert
            .transaction_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        match alert.severity {
            AlertSeverity::Critical => tracing::error!(
                alert_id = %alert.id,
                action = %alert.action,
                wallet_id = %wallet_id,
                transaction_id = %transaction_id,
                details = %alert.details,
                "CRITICAL ledger alert: manual intervention required"
            ),
            AlertSeverity::Warning => tracing::warn!(
                alert_id = %alert.id,
                action = %alert.action,
                wallet_id = %wallet_id,
                transaction_id = %transaction_id,
                details = %alert.details,
                "Ledger alert"
            ),
        }
    }
}

/// Keeps every alert in memory; also logs it
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<LedgerAlert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<LedgerAlert> {
        self.alerts.lock().clone()
    }

    pub fn count(&self, action: AlertAction) -> usize {
        self.alerts.lock().iter().filter(|a| a.action == action).count()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn raise(&self, alert: LedgerAlert) {
        TracingAlertSink.raise(alert.clone()).await;
        self.alerts.lock().push(alert);
    }
}
