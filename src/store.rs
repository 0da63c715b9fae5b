//! User data persistence
//!
//! Records, categories, display currency and budget limit per user. The
//! dispatcher only sees the [`UserDataStore`](crate::runtime::UserDataStore)
//! trait; [`SqliteStore`] is the production adapter.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Chat participant id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single expense, amount in base currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseRecord {
    pub user_id: UserId,
    pub category: String,
    pub amount: Decimal,
    pub period: DateTime<Utc>,
}

/// Spending of one category over a report window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub category: String,
    pub amount: Decimal,
}

impl ReportRow {
    pub fn new(category: impl Into<String>, amount: Decimal) -> Self {
        Self {
            category: category.into(),
            amount,
        }
    }
}

/// Result of a limit-aware insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Saved,
    /// The record would push the month's spending over the user's limit and was not stored
    OverLimit,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
    #[error("Sum of {column} is out of range")]
    Overflow { column: &'static str },
}

pub type StoreResult<T> = Result<T, StoreError>;
