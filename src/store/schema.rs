//! Database schema

/// SQL schema for initialization
///
/// Amounts are stored as decimal text in base currency, timestamps as
/// RFC 3339 UTC text so that range comparisons work lexicographically.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    tg_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    currency TEXT,
    limits TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    name TEXT NOT NULL,

    UNIQUE (user_id, name),
    FOREIGN KEY (user_id) REFERENCES users(tg_id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    category TEXT NOT NULL,
    amount TEXT NOT NULL,
    period TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(tg_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_records_user_period ON records(user_id, period);
";
