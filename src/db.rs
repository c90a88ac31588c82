//! Database module
//!
//! Connectivity check and schema bootstrap.

use sqlx::{Executor, PgPool};

const SCHEMA: &str = include_str!("../migrations/0001_wallet_ledger.sql");

const REQUIRED_TABLES: [&str; 3] = ["wallets", "ledger_entries", "idempotency_records"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Create any missing tables and indexes. Idempotent.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    // unprepared: the whole script goes as one simple query
    pool.execute(SCHEMA).await?;
    tracing::info!("Database schema applied");
    Ok(())
}
