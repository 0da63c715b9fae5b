//! Parsing of user-typed amounts and bulk-import table lines

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Not a number: {0:?}")]
    InvalidAmount(String),
    #[error("Amount must not be negative: {0}")]
    NegativeAmount(String),
    #[error("Amount must be greater than zero")]
    ZeroAmount,
    #[error("Amount is too large: {0}")]
    AmountTooLarge(String),
    #[error("Line does not match `YYYY-MM-DD <amount> <category>`: {0:?}")]
    LineFormat(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

/// One successfully parsed line of a bulk import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLine {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub category: String,
}

fn line_regex() -> &'static Regex {
    static LINE: OnceLock<Regex> = OnceLock::new();
    LINE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}) (\d+(?:[.,]\d{1,2})?) (.+)$")
            .expect("line pattern is a valid regex")
    })
}

/// Largest amount accepted from user input
fn max_amount() -> Decimal {
    Decimal::new(1_000_000_000_000, 0)
}

/// Parse a non-negative decimal typed by the user
///
/// Accepts `,` as decimal separator and surrounding whitespace. Amounts above
/// one trillion are rejected so that sums stay far from `Decimal::MAX`.
pub fn parse_amount(text: &str) -> Result<Decimal, ParseError> {
    let trimmed = text.trim();
    let normalized = trimmed.replace(',', ".");
    let amount = Decimal::from_str(&normalized)
        .map_err(|_| ParseError::InvalidAmount(trimmed.to_string()))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ParseError::NegativeAmount(trimmed.to_string()));
    }
    if amount > max_amount() {
        return Err(ParseError::AmountTooLarge(trimmed.to_string()));
    }
    Ok(amount)
}

/// Parse an expense amount, which must be strictly positive
pub fn parse_expense_amount(text: &str) -> Result<Decimal, ParseError> {
    let amount = parse_amount(text)?;
    if amount.is_zero() {
        return Err(ParseError::ZeroAmount);
    }
    Ok(amount)
}

/// Parse a single `YYYY-MM-DD <amount> <category>` line
pub fn parse_import_line(line: &str) -> Result<ImportLine, ParseError> {
    let line = line.trim_end_matches('\r');
    let caps = line_regex()
        .captures(line)
        .ok_or_else(|| ParseError::LineFormat(line.to_string()))?;

    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d")
        .map_err(|e| ParseError::InvalidDate(format!("{}: {e}", &caps[1])))?;
    let amount = parse_expense_amount(&caps[2])?;
    let category = caps[3].trim().to_string();
    if category.is_empty() {
        return Err(ParseError::LineFormat(line.to_string()));
    }

    Ok(ImportLine {
        date,
        amount,
        category,
    })
}
