//! SQL schema for the zpresence SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! layout so later migrations can be gated on it.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS accounts (
    account_id         TEXT PRIMARY KEY,            -- 'zoom_<slug>'
    name               TEXT NOT NULL,
    client_id          TEXT NOT NULL,
    client_secret      TEXT NOT NULL,
    verification_token TEXT NOT NULL,
    token_json         TEXT,                        -- JSON TokenState or NULL
    options_json       TEXT NOT NULL DEFAULT '{}',  -- JSON MonitorOptions
    created_at         TEXT NOT NULL                -- ISO 8601 UTC
);

CREATE INDEX IF NOT EXISTS accounts_created_idx ON accounts(created_at);

PRAGMA user_version = 1;
";
