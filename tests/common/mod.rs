//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use wallet_ledger::alert::RecordingAlertSink;
use wallet_ledger::coordinator::TransactionCoordinator;
use wallet_ledger::domain::{
    Amount, Currency, EntryMetadata, OperationContext, SystemAccounts, Wallet,
};
use wallet_ledger::idempotency::InMemoryIdempotencyGuard;
use wallet_ledger::ledger_store::InMemoryLedgerStore;
use wallet_ledger::reconciliation::ReconciliationService;
use wallet_ledger::wallet_store::InMemoryWalletStore;

/// Coordinator and reconciliation wired to in-memory stores
pub struct Harness {
    pub ledger: Arc<InMemoryLedgerStore>,
    pub idempotency: Arc<InMemoryIdempotencyGuard>,
    pub wallets: Arc<InMemoryWalletStore>,
    pub alerts: Arc<RecordingAlertSink>,
    pub coordinator: TransactionCoordinator,
    pub reconciliation: ReconciliationService,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyGuard::new());
        let wallets = Arc::new(InMemoryWalletStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let system = SystemAccounts::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let coordinator = TransactionCoordinator::new(
            ledger.clone(),
            idempotency.clone(),
            wallets.clone(),
            alerts.clone(),
            system,
        );
        let reconciliation =
            ReconciliationService::new(ledger.clone(), wallets.clone(), alerts.clone());

        Self {
            ledger,
            idempotency,
            wallets,
            alerts,
            coordinator,
            reconciliation,
        }
    }

    pub async fn open_wallet(&self) -> Wallet {
        self.coordinator
            .open_wallet(Uuid::new_v4(), None)
            .await
            .expect("Failed to open wallet")
    }

    /// Deposit under a throwaway key and return the reloaded wallet
    pub async fn fund(&self, wallet: &Wallet, minor: i64) -> Wallet {
        self.coordinator
            .execute_deposit(
                &OperationContext::new(),
                wallet,
                &usd(),
                usd_amount(minor),
                &format!("fund-{}", Uuid::new_v4()),
                EntryMetadata::new(),
            )
            .await
            .expect("Failed to fund wallet");
        self.reload(wallet).await
    }

    pub async fn reload(&self, wallet: &Wallet) -> Wallet {
        self.coordinator
            .load_wallet(wallet.id())
            .await
            .expect("Failed to reload wallet")
    }

    pub async fn ledger_balance(&self, wallet: &Wallet) -> i64 {
        self.coordinator
            .authoritative_balance(wallet, &usd())
            .await
            .expect("Failed to compute balance")
            .minor()
    }
}

pub fn usd() -> Currency {
    Currency::new("USD").unwrap()
}

pub fn usd_amount(minor: i64) -> Amount {
    Amount::from_minor(minor, usd())
}

/// Connect to DATABASE_URL, apply the schema and clear all rows
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    wallet_ledger::db::apply_schema(&pool)
        .await
        .expect("Failed to apply schema");

    sqlx::query("TRUNCATE TABLE ledger_entries, idempotency_records, wallets")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    pool
}
