//! wallet_ledger - reconciliation daemon
//!
//! Connects to the ledger database and periodically reconciles every wallet's
//! cached balances against the ledger, escalating persistent drift.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::alert::TracingAlertSink;
use wallet_ledger::config::Config;
use wallet_ledger::db;
use wallet_ledger::jobs::ReconciliationScheduler;
use wallet_ledger::ledger_store::PgLedgerStore;
use wallet_ledger::reconciliation::ReconciliationService;
use wallet_ledger::wallet_store::PgWalletStore;

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wallet_ledger=debug".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    tracing::info!(environment = %config.environment, "Starting wallet_ledger reconciliation daemon");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        if config.is_production() {
            tracing::error!("Database schema is not complete. Please run migrations.");
            return Err(anyhow::anyhow!("Database schema incomplete"));
        }
        db::apply_schema(&pool).await?;
    }
    tracing::info!("Database connected successfully");

    let retry = config.retry_policy();
    let service = ReconciliationService::new(
        Arc::new(PgLedgerStore::with_retry(pool.clone(), retry)),
        Arc::new(PgWalletStore::with_retry(pool.clone(), retry)),
        Arc::new(TracingAlertSink),
    );
    let scheduler = ReconciliationScheduler::with_config(service, config.scheduler_config()).start();

    shutdown_signal().await?;

    // Cleanup
    tracing::info!("Shutting down...");
    scheduler.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            },
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            },
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
    }

    Ok(())
}
