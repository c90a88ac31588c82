//! Idempotency module
//!
//! Maps client idempotency keys to the transaction they produced. A key is
//! claimed with a single insert-if-absent step and never rebound.

mod memory;
mod repository;

pub use memory::InMemoryIdempotencyGuard;
pub use repository::PgIdempotencyGuard;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{Amount, OperationType};
use crate::ledger_store::StoreError;

/// Stored binding of a key to its transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub transaction_id: Uuid,
    pub request_hash: String,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(key: &str, transaction_id: Uuid, request_hash: String) -> Self {
        Self {
            key: key.to_string(),
            transaction_id,
            request_hash,
            created_at: Utc::now(),
        }
    }
}

/// Result of an insert-if-absent claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Existing(IdempotencyRecord),
}

#[async_trait]
pub trait IdempotencyGuard: Send + Sync {
    /// Atomically bind the key unless it is already bound
    async fn insert_if_absent(&self, record: &IdempotencyRecord)
        -> Result<InsertOutcome, StoreError>;

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Compensation only: unbind `key` if it still points at `transaction_id`.
    /// Returns whether a record was removed.
    async fn release(&self, key: &str, transaction_id: Uuid) -> Result<bool, StoreError>;
}

/// SHA-256 fingerprint of what a request asked for
pub fn compute_request_hash(wallet_id: Uuid, operation: OperationType, amount: &Amount) -> String {
    let mut hasher = Sha256::new();
    hasher.update(wallet_id.as_bytes());
    hasher.update(operation.as_str().as_bytes());
    hasher.update(amount.minor().to_be_bytes());
    hasher.update(amount.currency().as_str().as_bytes());
    hex::encode(hasher.finalize())
}
