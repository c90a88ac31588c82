//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::coordinator::CoordinatorSettings;
use crate::domain::SystemAccounts;
use crate::jobs::SchedulerConfig;
use crate::ledger_store::RetryPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// System accounts every posting pairs against
    pub system_accounts: SystemAccounts,

    pub wallet_lock_timeout: Duration,

    /// Trailing window for daily prize caps
    pub prize_window_hours: i64,

    pub store_max_retries: u32,
    pub store_retry_base_delay: Duration,

    pub reconciliation_interval: Duration,
    pub reconciliation_page_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let system_accounts = SystemAccounts::new(
            required_uuid(&lookup, "SYSTEM_LIABILITY_ACCOUNT_ID")?,
            required_uuid(&lookup, "SYSTEM_EXPENSE_ACCOUNT_ID")?,
            required_uuid(&lookup, "SYSTEM_REVENUE_ACCOUNT_ID")?,
        );
        if !system_accounts.is_distinct() {
            return Err(ConfigError::DuplicateSystemAccounts);
        }

        let lock_timeout_ms = parse_or(&lookup, "WALLET_LOCK_TIMEOUT_MS", 5000u64)?;
        if lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("WALLET_LOCK_TIMEOUT_MS"));
        }

        let prize_window_hours = parse_or(&lookup, "PRIZE_WINDOW_HOURS", 24i64)?;
        if prize_window_hours <= 0 {
            return Err(ConfigError::InvalidValue("PRIZE_WINDOW_HOURS"));
        }

        let store_max_retries = parse_or(&lookup, "STORE_MAX_RETRIES", 3u32)?;
        let retry_delay_ms = parse_or(&lookup, "STORE_RETRY_BASE_DELAY_MS", 50u64)?;

        let interval_secs = parse_or(&lookup, "RECONCILIATION_INTERVAL_SECS", 300u64)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue("RECONCILIATION_INTERVAL_SECS"));
        }

        let reconciliation_page_size = parse_or(&lookup, "RECONCILIATION_PAGE_SIZE", 500i64)?;
        if reconciliation_page_size <= 0 {
            return Err(ConfigError::InvalidValue("RECONCILIATION_PAGE_SIZE"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            system_accounts,
            wallet_lock_timeout: Duration::from_millis(lock_timeout_ms),
            prize_window_hours,
            store_max_retries,
            store_retry_base_delay: Duration::from_millis(retry_delay_ms),
            reconciliation_interval: Duration::from_secs(interval_secs),
            reconciliation_page_size,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            lock_timeout: self.wallet_lock_timeout,
            prize_window: chrono::Duration::hours(self.prize_window_hours),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.store_max_retries.max(1),
            base_delay: self.store_retry_base_delay,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.reconciliation_interval,
            page_size: self.reconciliation_page_size,
            ..SchedulerConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

fn required_uuid<F>(lookup: &F, key: &'static str) -> Result<Uuid, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).ok_or(ConfigError::MissingEnv(key))?;
    Uuid::parse_str(raw.trim()).map_err(|_| ConfigError::InvalidValue(key))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("System liability, expense and revenue accounts must be distinct")]
    DuplicateSystemAccounts,
}
