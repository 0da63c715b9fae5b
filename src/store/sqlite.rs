//! SQLite-backed user data store

use super::schema::SCHEMA;
use super::{ExpenseRecord, InsertOutcome, ReportRow, StoreError, StoreResult, UserId};
use crate::period::{month_start, next_month_start, start_of_day};
use crate::runtime::UserDataStore;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe database handle
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    default_currency: String,
}

impl SqliteStore {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P, default_currency: impl Into<String>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, default_currency.into())
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory(default_currency: impl Into<String>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, default_currency.into())
    }

    fn init(conn: Connection, default_currency: String) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_currency,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the user on first write, keep the name current afterwards
    fn ensure_user(&self, conn: &Connection, user_id: UserId, user_name: &str) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO users (tg_id, name, currency, limits, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)
             ON CONFLICT (tg_id) DO UPDATE SET name = excluded.name",
            params![
                user_id.0,
                user_name,
                self.default_currency,
                timestamp(Utc::now())
            ],
        )?;
        Ok(())
    }

    // ==================== Records ====================

    pub fn insert_record(
        &self,
        record: &ExpenseRecord,
        user_name: &str,
        budget_month: NaiveDate,
    ) -> StoreResult<InsertOutcome> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        self.ensure_user(&tx, record.user_id, user_name)?;

        let limit: Option<String> = tx.query_row(
            "SELECT limits FROM users WHERE tg_id = ?1",
            params![record.user_id.0],
            |row| row.get(0),
        )?;

        if let Some(limit) = limit.map(|raw| parse_decimal("limits", raw)).transpose()? {
            if !limit.is_zero() {
                let from = timestamp(start_of_day(month_start(budget_month)));
                let until = timestamp(start_of_day(next_month_start(budget_month)));
                let mut stmt = tx.prepare(
                    "SELECT amount FROM records
                     WHERE user_id = ?1 AND period >= ?2 AND period < ?3",
                )?;
                let amounts = stmt.query_map(params![record.user_id.0, from, until], |row| {
                    row.get::<_, String>(0)
                })?;
                let mut spent = Some(Decimal::ZERO);
                for amount in amounts {
                    let amount = parse_decimal("amount", amount?)?;
                    spent = spent.and_then(|sum| sum.checked_add(amount));
                }
                // A total past `Decimal::MAX` is over any limit
                let over_limit = match spent.and_then(|sum| sum.checked_add(record.amount)) {
                    Some(total) => total > limit,
                    None => true,
                };
                if over_limit {
                    tracing::info!(
                        user_id = %record.user_id,
                        spent = ?spent,
                        limit = %limit,
                        "Record rejected, monthly limit exceeded"
                    );
                    return Ok(InsertOutcome::OverLimit);
                }
            }
        }

        tx.execute(
            "INSERT INTO records (user_id, category, amount, period) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.user_id.0,
                record.category,
                record.amount.to_string(),
                timestamp(record.period)
            ],
        )?;
        tx.commit()?;
        Ok(InsertOutcome::Saved)
    }

    pub fn report_rows(&self, user_id: UserId, since: DateTime<Utc>) -> StoreResult<Vec<ReportRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT category, amount FROM records WHERE user_id = ?1 AND period >= ?2",
        )?;
        let rows = stmt.query_map(params![user_id.0, timestamp(since)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
        for row in rows {
            let (category, amount) = row?;
            let amount = parse_decimal("amount", amount)?;
            let total = totals.entry(category).or_insert(Decimal::ZERO);
            *total = total
                .checked_add(amount)
                .ok_or(StoreError::Overflow { column: "amount" })?;
        }

        Ok(totals
            .into_iter()
            .map(|(category, amount)| ReportRow { category, amount })
            .collect())
    }

    // ==================== Categories ====================

    pub fn insert_category(&self, user_id: UserId, name: &str, user_name: &str) -> StoreResult<()> {
        let conn = self.lock();
        self.ensure_user(&conn, user_id, user_name)?;
        conn.execute(
            "INSERT INTO categories (user_id, name) VALUES (?1, ?2)
             ON CONFLICT (user_id, name) DO NOTHING",
            params![user_id.0, name],
        )?;
        Ok(())
    }

    pub fn categories(&self, user_id: UserId) -> StoreResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT name FROM categories WHERE user_id = ?1 ORDER BY id")?;
        let names = stmt
            .query_map(params![user_id.0], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    // ==================== Settings ====================

    pub fn currency(&self, user_id: UserId) -> StoreResult<Option<String>> {
        let conn = self.lock();
        let currency: Option<Option<String>> = conn
            .query_row(
                "SELECT currency FROM users WHERE tg_id = ?1",
                params![user_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(currency.flatten())
    }

    pub fn set_currency(&self, user_id: UserId, code: &str, user_name: &str) -> StoreResult<()> {
        let conn = self.lock();
        self.ensure_user(&conn, user_id, user_name)?;
        conn.execute(
            "UPDATE users SET currency = ?2 WHERE tg_id = ?1",
            params![user_id.0, code],
        )?;
        Ok(())
    }

    pub fn limit(&self, user_id: UserId) -> StoreResult<Option<Decimal>> {
        let conn = self.lock();
        let limit: Option<Option<String>> = conn
            .query_row(
                "SELECT limits FROM users WHERE tg_id = ?1",
                params![user_id.0],
                |row| row.get(0),
            )
            .optional()?;
        limit
            .flatten()
            .map(|raw| parse_decimal("limits", raw))
            .transpose()
    }

    pub fn set_limit(
        &self,
        user_id: UserId,
        limit: Option<Decimal>,
        user_name: &str,
    ) -> StoreResult<()> {
        let conn = self.lock();
        self.ensure_user(&conn, user_id, user_name)?;
        conn.execute(
            "UPDATE users SET limits = ?2 WHERE tg_id = ?1",
            params![user_id.0, limit.map(|l| l.to_string())],
        )?;
        Ok(())
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_decimal(column: &'static str, value: String) -> StoreResult<Decimal> {
    Decimal::from_str(&value).map_err(|_| StoreError::Corrupt { column, value })
}

#[async_trait]
impl UserDataStore for SqliteStore {
    async fn insert_record(
        &self,
        record: &ExpenseRecord,
        user_name: &str,
        budget_month: NaiveDate,
    ) -> StoreResult<InsertOutcome> {
        SqliteStore::insert_record(self, record, user_name, budget_month)
    }

    async fn report_rows(&self, user_id: UserId, since: DateTime<Utc>) -> StoreResult<Vec<ReportRow>> {
        SqliteStore::report_rows(self, user_id, since)
    }

    async fn insert_category(&self, user_id: UserId, name: &str, user_name: &str) -> StoreResult<()> {
        SqliteStore::insert_category(self, user_id, name, user_name)
    }

    async fn categories(&self, user_id: UserId) -> StoreResult<Vec<String>> {
        SqliteStore::categories(self, user_id)
    }

    async fn currency(&self, user_id: UserId) -> StoreResult<Option<String>> {
        SqliteStore::currency(self, user_id)
    }

    async fn set_currency(&self, user_id: UserId, code: &str, user_name: &str) -> StoreResult<()> {
        SqliteStore::set_currency(self, user_id, code, user_name)
    }

    async fn limit(&self, user_id: UserId) -> StoreResult<Option<Decimal>> {
        SqliteStore::limit(self, user_id)
    }

    async fn set_limit(
        &self,
        user_id: UserId,
        limit: Option<Decimal>,
        user_name: &str,
    ) -> StoreResult<()> {
        SqliteStore::set_limit(self, user_id, limit, user_name)
    }
}
