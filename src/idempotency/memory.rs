//! In-memory idempotency guard

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::ledger_store::StoreError;

use super::{IdempotencyGuard, IdempotencyRecord, InsertOutcome};

#[derive(Debug, Default)]
pub struct InMemoryIdempotencyGuard {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryIdempotencyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl IdempotencyGuard for InMemoryIdempotencyGuard {
    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let mut records = self.records.lock();
        if let Some(existing) = records.get(&record.key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        records.insert(record.key.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn release(&self, key: &str, transaction_id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        match records.get(key) {
            Some(existing) if existing.transaction_id == transaction_id => {
                records.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
