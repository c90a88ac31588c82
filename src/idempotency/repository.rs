//! Idempotency Repository
//!
//! PostgreSQL-backed idempotency guard. The primary key on `key` makes
//! `INSERT ... ON CONFLICT DO NOTHING` the atomic claim.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ledger_store::{RetryPolicy, StoreError};

use super::{IdempotencyGuard, IdempotencyRecord, InsertOutcome};

/// Repository for idempotency records
#[derive(Debug, Clone)]
pub struct PgIdempotencyGuard {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgIdempotencyGuard {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }
}

#[async_trait]
impl IdempotencyGuard for PgIdempotencyGuard {
    async fn insert_if_absent(
        &self,
        record: &IdempotencyRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let inserted: Option<String> = self
            .retry
            .run("idempotency_insert", || async {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO idempotency_records (key, transaction_id, request_hash, created_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (key) DO NOTHING
                    RETURNING key
                    "#,
                )
                .bind(&record.key)
                .bind(record.transaction_id)
                .bind(&record.request_hash)
                .bind(record.created_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        if inserted.is_some() {
            return Ok(InsertOutcome::Inserted);
        }

        // Lost the race: hand back whoever holds the key
        match self.find(&record.key).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StoreError::DuplicateKey(record.key.clone())),
        }
    }

    async fn find(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        let row: Option<(String, Uuid, String, DateTime<Utc>)> = self
            .retry
            .run("idempotency_find", || async {
                sqlx::query_as(
                    r#"
                    SELECT key, transaction_id, request_hash, created_at
                    FROM idempotency_records
                    WHERE key = $1
                    "#,
                )
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        Ok(row.map(
            |(key, transaction_id, request_hash, created_at)| IdempotencyRecord {
                key,
                transaction_id,
                request_hash,
                created_at,
            },
        ))
    }

    async fn release(&self, key: &str, transaction_id: Uuid) -> Result<bool, StoreError> {
        let result = self
            .retry
            .run("idempotency_release", || async {
                sqlx::query(
                    "DELETE FROM idempotency_records WHERE key = $1 AND transaction_id = $2",
                )
                .bind(key)
                .bind(transaction_id)
                .execute(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        if result.rows_affected() > 0 {
            tracing::warn!(key = key, transaction_id = %transaction_id, "Idempotency key released");
        }
        Ok(result.rows_affected() > 0)
    }
}
