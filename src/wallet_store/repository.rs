//! PostgreSQL wallet store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::Wallet;
use crate::ledger_store::{RetryPolicy, StoreError};

use super::WalletStore;

type WalletRow = (
    Uuid,
    Uuid,
    Option<String>,
    serde_json::Value,
    serde_json::Value,
    i64,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// Fields compared when a save is rejected
type StoredState = (i64, Option<String>, serde_json::Value, serde_json::Value);

#[derive(Debug, Clone)]
pub struct PgWalletStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PgWalletStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn stored_state(&self, id: Uuid) -> Result<Option<StoredState>, StoreError> {
        let state: Option<StoredState> = sqlx::query_as(
            "SELECT version, chain_address, asset_accounts, cached_balances FROM wallets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }
}


#[async_trait]
impl WalletStore for PgWalletStore {
    async fn save(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let asset_accounts = serde_json::to_value(wallet.asset_accounts())?;
        let cached_balances = serde_json::to_value(wallet.cached_balances())?;

        // Upsert only when the stored row is exactly one version behind
        let saved: Option<i64> = self
            .retry
            .run("wallet_save", || async {
                sqlx::query_scalar(
                    r#"
                    INSERT INTO wallets (
                        id, owner_id, chain_address, asset_accounts, cached_balances,
                        version, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    ON CONFLICT (id) DO UPDATE SET
                        chain_address = EXCLUDED.chain_address,
                        asset_accounts = EXCLUDED.asset_accounts,
                        cached_balances = EXCLUDED.cached_balances,
                        version = EXCLUDED.version,
                        updated_at = EXCLUDED.updated_at
                    WHERE wallets.version = EXCLUDED.version - 1
                    RETURNING version
                    "#,
                )
                .bind(wallet.id())
                .bind(wallet.owner_id())
                .bind(wallet.chain_address())
                .bind(&asset_accounts)
                .bind(&cached_balances)
                .bind(wallet.version())
                .bind(wallet.created_at())
                .bind(wallet.updated_at())
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        if saved.is_some() {
            return Ok(());
        }

        // A retried upsert whose first attempt committed finds its own row
        let stored = self.stored_state(wallet.id()).await?;
        if let Some((version, chain_address, accounts, balances)) = &stored {
            if *version == wallet.version()
                && chain_address.as_deref() == wallet.chain_address()
                && *accounts == asset_accounts
                && *balances == cached_balances
            {
                tracing::debug!(
                    wallet_id = %wallet.id(),
                    version = *version,
                    "Wallet save already applied"
                );
                return Ok(());
            }
        }

        let actual = stored.map(|(version, ..)| version).unwrap_or(0);
        tracing::warn!(
            wallet_id = %wallet.id(),
            stored_version = actual,
            attempted_version = wallet.version(),
            "Wallet save rejected by version check"
        );
        Err(StoreError::VersionConflict {
            id: wallet.id(),
            expected: actual + 1,
            actual: wallet.version(),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = self
            .retry
            .run("wallet_find", || async {
                sqlx::query_as(
                    r#"
                    SELECT id, owner_id, chain_address, asset_accounts, cached_balances,
                           version, created_at, updated_at
                    FROM wallets
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(StoreError::from)
            })
            .await?;

        row.map(row_to_wallet).transpose()
    }

    async fn list_ids(&self, limit: i64, offset: i64) -> Result<Vec<Uuid>, StoreError> {
        self.retry
            .run("wallet_list_ids", || async {
                sqlx::query_scalar("SELECT id FROM wallets ORDER BY id LIMIT $1 OFFSET $2")
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(StoreError::from)
            })
            .await
    }
}

fn row_to_wallet(row: WalletRow) -> Result<Wallet, StoreError> {
    let (id, owner_id, chain_address, asset_accounts, cached_balances, version, created_at, updated_at) =
        row;

    Ok(Wallet::restore(
        id,
        owner_id,
        chain_address,
        serde_json::from_value(asset_accounts)?,
        serde_json::from_value(cached_balances)?,
        version,
        created_at,
        updated_at,
    ))
}
