//! PostgreSQL ledger store
//!
//! Entries of one transaction are inserted in a single database transaction
//! so a crash never leaves half a posting pair behind.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountType, Amount, Currency, EntryMetadata, EntryType, LedgerEntry, OperationType,
};

use super::{is_unique_violation, AccountTotals, LedgerStore, RetryPolicy, StoreError};

const ENTRY_COLUMNS: &str = r#"
    id, transaction_id, account_id, account_type, entry_type, category,
    amount_minor, currency, metadata, created_at
"#;

#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    // =========================================================================
    // append (single attempt)
    // =========================================================================

    async fn try_append(
        &self,
        transaction_id: Uuid,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            if entry.transaction_id != transaction_id {
                return Err(StoreError::Corrupt(format!(
                    "entry {} does not belong to transaction {}",
                    entry.id, transaction_id
                )));
            }
            self.insert_entry(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_entry(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        let metadata = serde_json::to_value(&entry.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                id, transaction_id, account_id, account_type, entry_type, category,
                amount_minor, currency, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.transaction_id)
        .bind(entry.account_id)
        .bind(entry.account_type.as_str())
        .bind(entry.entry_type.as_str())
        .bind(entry.category.as_str())
        .bind(entry.amount.minor())
        .bind(entry.currency().as_str())
        .bind(metadata)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateKey(entry.id.to_string())
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn append_entries(
        &self,
        transaction_id: Uuid,
        entries: &[LedgerEntry],
    ) -> Result<(), StoreError> {
        self.retry
            .run("append_entries", || self.try_append(transaction_id, entries))
            .await?;

        tracing::debug!(
            transaction_id = %transaction_id,
            entries = entries.len(),
            "Ledger entries appended"
        );
        Ok(())
    }

    async fn delete_transaction_entries(&self, transaction_id: Uuid) -> Result<u64, StoreError> {
        let result = self
            .retry
            .run("delete_transaction_entries", || async {
                sqlx::query("DELETE FROM ledger_entries WHERE transaction_id = $1")
                    .bind(transaction_id)
                    .execute(&self.pool)
                    .await
                    .map_err(StoreError::from)
            })
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: Uuid,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM ledger_entries WHERE transaction_id = $1 ORDER BY created_at, entry_type DESC",
            ENTRY_COLUMNS
        );

        let rows = self
            .retry
            .run("find_by_transaction_id", || async {
                sqlx::query(&sql)
                    .bind(transaction_id)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(StoreError::from)
            })
            .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn find_by_account_id(
        &self,
        account_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM ledger_entries
            WHERE account_id = $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2 OFFSET $3
            "#,
            ENTRY_COLUMNS
        );

        let rows = self
            .retry
            .run("find_by_account_id", || async {
                sqlx::query(&sql)
                    .bind(account_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(StoreError::from)
            })
            .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn calculate_balance(
        &self,
        account: &Account,
        currency: &Currency,
    ) -> Result<Amount, StoreError> {
        let increasing_side = account.account_type.increases_with().as_str();

        let minor: i64 = self
            .retry
            .run("calculate_balance", || async {
                sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(SUM(
                        CASE WHEN entry_type = $3 THEN amount_minor ELSE -amount_minor END
                    ), 0)::BIGINT
                    FROM ledger_entries
                    WHERE account_id = $1 AND currency = $2
                    "#,
                )
                .bind(account.id)
                .bind(currency.as_str())
                .bind(increasing_side)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        Ok(Amount::from_minor(minor, currency.clone()))
    }

    async fn sum_postings_since(
        &self,
        account: &Account,
        currency: &Currency,
        category: OperationType,
        entry_type: EntryType,
        since: DateTime<Utc>,
    ) -> Result<Amount, StoreError> {
        let minor: i64 = self
            .retry
            .run("sum_postings_since", || async {
                sqlx::query_scalar(
                    r#"
                    SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
                    FROM ledger_entries
                    WHERE account_id = $1
                      AND currency = $2
                      AND category = $3
                      AND entry_type = $4
                      AND created_at >= $5
                    "#,
                )
                .bind(account.id)
                .bind(currency.as_str())
                .bind(category.as_str())
                .bind(entry_type.as_str())
                .bind(since)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        Ok(Amount::from_minor(minor, currency.clone()))
    }

    async fn account_totals(&self, currency: &Currency) -> Result<Vec<AccountTotals>, StoreError> {
        let rows = self
            .retry
            .run("account_totals", || async {
                sqlx::query(
                    r#"
                    SELECT account_id, account_type,
                        COALESCE(SUM(amount_minor) FILTER (WHERE entry_type = 'debit'), 0)::BIGINT AS debits,
                        COALESCE(SUM(amount_minor) FILTER (WHERE entry_type = 'credit'), 0)::BIGINT AS credits
                    FROM ledger_entries
                    WHERE currency = $1
                    GROUP BY account_id, account_type
                    ORDER BY account_id
                    "#,
                )
                .bind(currency.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        rows.iter()
            .map(|row| -> Result<AccountTotals, StoreError> {
                let account_type: String = row.try_get("account_type")?;
                Ok(AccountTotals {
                    account_id: row.try_get("account_id")?,
                    account_type: account_type
                        .parse::<AccountType>()
                        .map_err(StoreError::Corrupt)?,
                    debits: Amount::from_minor(row.try_get("debits")?, currency.clone()),
                    credits: Amount::from_minor(row.try_get("credits")?, currency.clone()),
                })
            })
            .collect()
    }
}

fn row_to_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    let account_type: String = row.try_get("account_type")?;
    let entry_type: String = row.try_get("entry_type")?;
    let category: String = row.try_get("category")?;
    let currency: String = row.try_get("currency")?;
    let metadata: serde_json::Value = row.try_get("metadata")?;

    let currency = Currency::new(&currency).map_err(|e| StoreError::Corrupt(e.to_string()))?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        transaction_id: row.try_get("transaction_id")?,
        account_id: row.try_get("account_id")?,
        account_type: account_type
            .parse::<AccountType>()
            .map_err(StoreError::Corrupt)?,
        entry_type: entry_type.parse::<EntryType>().map_err(StoreError::Corrupt)?,
        category: category
            .parse::<OperationType>()
            .map_err(StoreError::Corrupt)?,
        amount: Amount::from_minor(row.try_get("amount_minor")?, currency),
        created_at: row.try_get("created_at")?,
        metadata: serde_json::from_value::<EntryMetadata>(metadata)?,
    })
}
