//! Error handling module
//!
//! Centralized error type for ledger operations and its caller-facing body.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Amount, Currency, MoneyError, PostingError};
use crate::ledger_store::StoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Business rejections: nothing was written
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Amount, available: Amount },

    #[error("Daily limit exceeded: limit {limit}, already credited {credited}, requested {requested}")]
    DailyLimitExceeded {
        limit: Amount,
        credited: Amount,
        requested: Amount,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    // Concurrency
    #[error("Idempotency conflict for key {key}")]
    IdempotencyConflict { key: String },

    #[error("Timed out after {waited_ms}ms waiting for lock on {resource}")]
    LockTimeout { resource: Uuid, waited_ms: u64 },

    #[error("Operation cancelled before commit")]
    Cancelled,

    // Storage
    #[error("Ledger write failed for transaction {transaction_id}; rolled back")]
    LedgerWriteFailed {
        transaction_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("Rollback failed for transaction {transaction_id}: write error: {write_error}; rollback error: {rollback_error}")]
    RollbackFailed {
        transaction_id: Uuid,
        write_error: String,
        rollback_error: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    BusinessRule,
    NotFound,
    Conflict,
    Unavailable,
    Storage,
    Critical,
}

/// Serializable error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub error_code: String,
    pub message: String,
    pub retryable: bool,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidRequest(_)
            | LedgerError::InvalidAmount(_)
            | LedgerError::CurrencyMismatch { .. }
            | LedgerError::InvalidReference(_) => ErrorKind::Validation,
            LedgerError::InsufficientBalance { .. } | LedgerError::DailyLimitExceeded { .. } => {
                ErrorKind::BusinessRule
            }
            LedgerError::WalletNotFound(_) => ErrorKind::NotFound,
            LedgerError::IdempotencyConflict { .. } => ErrorKind::Conflict,
            LedgerError::LockTimeout { .. } | LedgerError::Cancelled => ErrorKind::Unavailable,
            LedgerError::LedgerWriteFailed { .. }
            | LedgerError::Store(_)
            | LedgerError::Internal(_) => ErrorKind::Storage,
            LedgerError::RollbackFailed { .. } => ErrorKind::Critical,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            LedgerError::InvalidRequest(_) => "invalid_request",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::CurrencyMismatch { .. } => "currency_mismatch",
            LedgerError::InvalidReference(_) => "invalid_reference",
            LedgerError::WalletNotFound(_) => "wallet_not_found",
            LedgerError::IdempotencyConflict { .. } => "idempotency_conflict",
            LedgerError::LockTimeout { .. } => "lock_timeout",
            LedgerError::Cancelled => "cancelled",
            LedgerError::LedgerWriteFailed { .. } => "ledger_write_failed",
            LedgerError::RollbackFailed { .. } => "rollback_failed",
            LedgerError::Store(_) => "store_error",
            LedgerError::Internal(_) => "internal_error",
        }
    }

    /// Rejected by a business rule; the ledger is unchanged
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::BusinessRule | ErrorKind::NotFound
        )
    }

    /// The same request may succeed if resubmitted with the same key
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::LockTimeout { .. }
            | LedgerError::Cancelled
            | LedgerError::IdempotencyConflict { .. }
            | LedgerError::LedgerWriteFailed { .. } => true,
            LedgerError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn requires_operator_attention(&self) -> bool {
        matches!(self, LedgerError::RollbackFailed { .. })
    }

    /// Caller-facing body. Storage details are logged, never exposed.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            LedgerError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                "storage error".to_string()
            }
            LedgerError::LedgerWriteFailed { transaction_id, source } => {
                tracing::error!(transaction_id = %transaction_id, "Ledger write failed: {:?}", source);
                "ledger write failed; no changes were applied".to_string()
            }
            LedgerError::RollbackFailed { transaction_id, .. } => {
                tracing::error!(transaction_id = %transaction_id, "Rollback failed: {}", self);
                format!("transaction {} requires manual review", transaction_id)
            }
            LedgerError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        ErrorBody {
            kind: self.kind(),
            error_code: self.code().to_string(),
            message,
            retryable: self.is_retryable(),
        }
    }
}

impl From<MoneyError> for LedgerError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch { expected, found } => {
                LedgerError::CurrencyMismatch { expected, found }
            }
            other => LedgerError::InvalidAmount(other.to_string()),
        }
    }
}

impl From<PostingError> for LedgerError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::NonPositiveAmount(_) => LedgerError::InvalidAmount(err.to_string()),
            PostingError::SameAccount(_) => LedgerError::Internal(err.to_string()),
        }
    }
}
