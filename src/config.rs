//! Environment-driven configuration

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAIN_CURRENCY: &str = "BYN";
const DEFAULT_CURRENCIES: &str = "USD,EUR,RUB,BYN";
const DEFAULT_RATES: &str = "USD=0.31,EUR=0.29,RUB=29.5";
const DEFAULT_REPORT_CACHE_SIZE: usize = 100;
const DEFAULT_REPORT_QUEUE_SIZE: usize = 64;
const DEFAULT_REPORT_TOPIC: &str = "tgbot";
const DEFAULT_REPORT_RETRY_SECS: u64 = 60;
const DEFAULT_TURN_TIMEOUT_SECS: u64 = 10;

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub main_currency: String,
    pub currencies: Vec<String>,
    /// Units of each currency per one unit of the main currency
    pub rates: HashMap<String, Decimal>,
    pub report_cache_size: usize,
    pub report_queue_size: usize,
    pub report_topic: String,
    pub report_retry: Duration,
    pub turn_timeout: Duration,
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("SPENDBOT_DB_PATH").map_or_else(
            || {
                let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(format!("{home}/.spendbot/spendbot.db"))
            },
            PathBuf::from,
        );

        let main_currency = lookup("SPENDBOT_MAIN_CURRENCY")
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_MAIN_CURRENCY.to_string());

        let mut currencies =
            parse_currency_list(lookup("SPENDBOT_CURRENCIES").as_deref().unwrap_or(DEFAULT_CURRENCIES));
        if currencies.is_empty() {
            tracing::warn!("SPENDBOT_CURRENCIES is empty, using defaults");
            currencies = parse_currency_list(DEFAULT_CURRENCIES);
        }
        if !currencies.contains(&main_currency) {
            currencies.push(main_currency.clone());
        }

        let rates = match lookup("SPENDBOT_RATES") {
            Some(raw) => parse_rates(&raw).unwrap_or_else(|bad| {
                tracing::warn!(entry = %bad, "Invalid SPENDBOT_RATES entry, using defaults");
                default_rates()
            }),
            None => default_rates(),
        };

        Self {
            db_path,
            port: parsed(&lookup, "SPENDBOT_PORT", DEFAULT_PORT),
            main_currency,
            currencies,
            rates,
            report_cache_size: parsed(&lookup, "SPENDBOT_REPORT_CACHE_SIZE", DEFAULT_REPORT_CACHE_SIZE),
            report_queue_size: parsed(&lookup, "SPENDBOT_REPORT_QUEUE_SIZE", DEFAULT_REPORT_QUEUE_SIZE),
            report_topic: lookup("SPENDBOT_REPORT_TOPIC")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REPORT_TOPIC.to_string()),
            report_retry: Duration::from_secs(parsed(
                &lookup,
                "SPENDBOT_REPORT_RETRY_SECS",
                DEFAULT_REPORT_RETRY_SECS,
            )),
            turn_timeout: Duration::from_secs(parsed(
                &lookup,
                "SPENDBOT_TURN_TIMEOUT_SECS",
                DEFAULT_TURN_TIMEOUT_SECS,
            )),
        }
    }
}

/// Parse `key`, falling back to `default` when unset or invalid
fn parsed<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = lookup(key) else {
        return default;
    };
    if let Ok(value) = raw.trim().parse() {
        value
    } else {
        tracing::warn!(key, value = %raw, "Invalid configuration value, using default");
        default
    }
}

fn parse_currency_list(raw: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    for code in raw.split(',').map(|c| c.trim().to_uppercase()) {
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    }
    codes
}

/// Parse `CODE=rate,...`; returns the first bad entry on failure
fn parse_rates(raw: &str) -> Result<HashMap<String, Decimal>, String> {
    let mut rates = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((code, rate)) = entry.split_once('=') else {
            return Err(entry.to_string());
        };
        let rate = Decimal::from_str(rate.trim()).map_err(|_| entry.to_string())?;
        if rate <= Decimal::ZERO {
            return Err(entry.to_string());
        }
        rates.insert(code.trim().to_uppercase(), rate);
    }
    Ok(rates)
}

fn default_rates() -> HashMap<String, Decimal> {
    parse_rates(DEFAULT_RATES).unwrap_or_default()
}
