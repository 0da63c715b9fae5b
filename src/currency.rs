//! Currency conversion between a user's display currency and the base currency
//!
//! Rates are expressed as "units of currency per one unit of base". The base
//! currency always has rate 1. Amounts are never rounded here; rounding
//! happens only when a report is rendered.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("Unsupported currency: {0}")]
    Unsupported(String),
    #[error("No exchange rate loaded for {0}")]
    RateUnavailable(String),
    #[error("Invalid exchange rate for {code}: {rate}")]
    InvalidRate { code: String, rate: Decimal },
    #[error("Amount out of range while converting {0}")]
    Overflow(String),
}

/// Conversion contract consumed by the dispatcher and the report pipeline
pub trait ExchangeRates: Send + Sync {
    /// Convert an amount held in base currency into `code`
    fn from_base(&self, code: &str, amount: Decimal) -> Result<Decimal, CurrencyError>;

    /// Convert an amount expressed in `code` into base currency
    fn to_base(&self, code: &str, amount: Decimal) -> Result<Decimal, CurrencyError>;

    /// Rate of `code` relative to the base currency
    fn rate(&self, code: &str) -> Result<Decimal, CurrencyError>;

    /// Base currency code
    fn main_currency(&self) -> &str;

    /// Supported currency codes, in configured order
    fn currencies(&self) -> Vec<String>;
}

/// In-memory rate table
///
/// Refreshed as a whole through [`RateTable::update`]; every lookup reads the
/// table as it is at call time.
pub struct RateTable {
    main: String,
    supported: Vec<String>,
    rates: RwLock<HashMap<String, Decimal>>,
}

impl RateTable {
    pub fn new(
        main: impl Into<String>,
        supported: Vec<String>,
        rates: HashMap<String, Decimal>,
    ) -> Self {
        let main = main.into().to_uppercase();
        let mut supported: Vec<String> = supported.into_iter().map(|c| c.to_uppercase()).collect();
        if !supported.contains(&main) {
            supported.push(main.clone());
        }
        Self {
            main,
            supported,
            rates: RwLock::new(normalize(rates)),
        }
    }

    /// Replace the whole rate table
    #[allow(dead_code)] // Hook for the rate refresh job
    pub fn update(&self, rates: HashMap<String, Decimal>) {
        let rates = normalize(rates);
        tracing::info!(count = rates.len(), "Exchange rates updated");
        *self.rates.write().unwrap_or_else(PoisonError::into_inner) = rates;
    }
}

fn normalize(rates: HashMap<String, Decimal>) -> HashMap<String, Decimal> {
    rates
        .into_iter()
        .map(|(code, rate)| (code.to_uppercase(), rate))
        .collect()
}

impl ExchangeRates for RateTable {
    fn from_base(&self, code: &str, amount: Decimal) -> Result<Decimal, CurrencyError> {
        let rate = self.rate(code)?;
        amount
            .checked_mul(rate)
            .ok_or_else(|| CurrencyError::Overflow(code.to_string()))
    }

    fn to_base(&self, code: &str, amount: Decimal) -> Result<Decimal, CurrencyError> {
        let rate = self.rate(code)?;
        amount
            .checked_div(rate)
            .ok_or_else(|| CurrencyError::Overflow(code.to_string()))
    }

    fn rate(&self, code: &str) -> Result<Decimal, CurrencyError> {
        let code = code.to_uppercase();
        if !self.supported.contains(&code) {
            return Err(CurrencyError::Unsupported(code));
        }
        if code == self.main {
            return Ok(Decimal::ONE);
        }
        let rate = self
            .rates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&code)
            .copied()
            .ok_or_else(|| CurrencyError::RateUnavailable(code.clone()))?;
        if rate <= Decimal::ZERO {
            return Err(CurrencyError::InvalidRate { code, rate });
        }
        Ok(rate)
    }

    fn main_currency(&self) -> &str {
        &self.main
    }

    fn currencies(&self) -> Vec<String> {
        self.supported.clone()
    }
}
