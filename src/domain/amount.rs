//! Amount type
//!
//! Money primitive for the ledger. Amounts are integer counts of minor units
//! (scale 2) tagged with a currency code, so arithmetic never loses precision
//! and never mixes currencies silently.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Number of decimal places carried by every amount
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Basis points that make up a whole
pub const BPS_WHOLE: u32 = 10_000;

const MINOR_PER_MAJOR: i64 = 100;

/// Errors raised when constructing or combining amounts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Amount arithmetic overflow")]
    Overflow,

    #[error("Amount has too many decimal places (max {MINOR_UNIT_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("Invalid amount format: {0}")]
    ParseError(String),

    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),
}

/// Currency code, 3 to 10 ASCII alphanumerics, stored upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();
        let valid_len = (3..=10).contains(&code.len());
        if !valid_len || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// A signed quantity of minor units in one currency.
///
/// Amounts themselves may be zero or negative (balances, discrepancies).
/// Whether an amount is acceptable for a posting is decided by the caller.
///
/// # Example
/// ```
/// use wallet_ledger::domain::{Amount, Currency};
///
/// let usd = Currency::new("usd").unwrap();
/// let amount = Amount::from_major_str("100.50", usd).unwrap();
/// assert_eq!(amount.minor(), 10050);
/// assert_eq!(amount.to_string(), "100.50 USD");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    minor: i64,
    currency: Currency,
}

impl Amount {
    pub fn from_minor(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Convert a major-unit decimal (e.g. `12.34`) into minor units.
    ///
    /// # Errors
    /// - `MoneyError::TooManyDecimals` if more than 2 significant decimal places
    /// - `MoneyError::Overflow` if the value does not fit in an i64 of cents
    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        let normalized = value.normalize();
        if normalized.scale() > MINOR_UNIT_SCALE {
            return Err(MoneyError::TooManyDecimals(normalized.scale()));
        }

        let minor = normalized
            .checked_mul(Decimal::from(MINOR_PER_MAJOR))
            .and_then(|scaled| scaled.to_i64())
            .ok_or(MoneyError::Overflow)?;

        Ok(Self { minor, currency })
    }

    pub fn from_major_str(value: &str, currency: Currency) -> Result<Self, MoneyError> {
        let decimal = Decimal::from_str(value.trim())
            .map_err(|e| MoneyError::ParseError(e.to_string()))?;
        Self::from_decimal(decimal, currency)
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.minor, MINOR_UNIT_SCALE)
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    pub fn ensure_same_currency(&self, other: &Amount) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency.clone(),
                found: other.currency.clone(),
            });
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Amount) -> Result<Amount, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Amount) -> Result<Amount, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency.clone()))
    }

    pub fn negate(&self) -> Result<Amount, MoneyError> {
        let minor = self.minor.checked_neg().ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency.clone()))
    }

    pub fn abs(&self) -> Result<Amount, MoneyError> {
        let minor = self.minor.checked_abs().ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency.clone()))
    }

    /// Compare two amounts of the same currency.
    pub fn try_cmp(&self, other: &Amount) -> Result<Ordering, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(self.minor.cmp(&other.minor))
    }

    /// Split a non-negative amount across basis-point shares.
    ///
    /// Shares must sum to 10 000. Leftover minor units go to the shares with
    /// the largest truncated remainder (earlier shares win ties), so the parts
    /// always sum to `self`.
    pub fn split_bps(&self, shares_bps: &[u32]) -> Result<Vec<Amount>, MoneyError> {
        if self.is_negative() {
            return Err(MoneyError::InvalidAllocation(
                "cannot split a negative amount".to_string(),
            ));
        }
        let total: u64 = shares_bps.iter().map(|s| u64::from(*s)).sum();
        if shares_bps.is_empty() || total != u64::from(BPS_WHOLE) {
            return Err(MoneyError::InvalidAllocation(format!(
                "shares must sum to {} bps, got {}",
                BPS_WHOLE, total
            )));
        }

        let whole = i128::from(self.minor);
        let mut parts = Vec::with_capacity(shares_bps.len());
        let mut remainders = Vec::with_capacity(shares_bps.len());
        for (idx, bps) in shares_bps.iter().enumerate() {
            let product = whole * i128::from(*bps);
            parts.push(product / i128::from(BPS_WHOLE));
            remainders.push((product % i128::from(BPS_WHOLE), idx));
        }

        let allocated: i128 = parts.iter().sum();
        let mut leftover = whole - allocated;
        remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        for (_, idx) in remainders {
            if leftover == 0 {
                break;
            }
            parts[idx] += 1;
            leftover -= 1;
        }

        parts
            .into_iter()
            .map(|minor| {
                i64::try_from(minor)
                    .map(|minor| Amount::from_minor(minor, self.currency.clone()))
                    .map_err(|_| MoneyError::Overflow)
            })
            .collect()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal(), self.currency)
    }
}

impl Add for Amount {
    type Output = Result<Amount, MoneyError>;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(&rhs)
    }
}

impl Sub for Amount {
    type Output = Result<Amount, MoneyError>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(&rhs)
    }
}
