//! [`SqliteStore`], the SQLite implementation of [`ConfigStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use zpresence_core::{
  account::{AccountEntry, TokenState},
  contact::MonitorOptions,
  store::ConfigStore,
};

use crate::{
  Error, Result,
  encode::{ACCOUNT_COLUMNS, RawAccount, encode_dt, encode_options, encode_token},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An account store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-row `UPDATE` and report whether the account existed.
  async fn update_column(&self, sql: &'static str, account_id: &str, value: String) -> Result<()> {
    let id = account_id.to_owned();
    let updated = self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params![value, id])?))
      .await?;
    if updated == 0 {
      return Err(zpresence_core::Error::AccountNotFound(account_id.to_owned()).into());
    }
    Ok(())
  }
}

// ─── ConfigStore impl ────────────────────────────────────────────────────────

impl ConfigStore for SqliteStore {
  type Error = Error;

  async fn add_account(&self, entry: &AccountEntry) -> Result<()> {
    let account_id   = entry.account_id.clone();
    let name         = entry.name.clone();
    let creds        = entry.credentials.clone();
    let token_json   = entry.token.as_ref().map(encode_token).transpose()?;
    let options_json = encode_options(&entry.options)?;
    let created_at   = encode_dt(entry.created_at);

    let id = account_id.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM accounts WHERE account_id = ?1",
            rusqlite::params![id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if exists {
          return Ok(false);
        }

        conn.execute(
          "INSERT INTO accounts (
             account_id, name, client_id, client_secret,
             verification_token, token_json, options_json, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id,
            name,
            creds.client_id,
            creds.client_secret,
            creds.verification_token,
            token_json,
            options_json,
            created_at,
          ],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(zpresence_core::Error::AccountExists(account_id).into());
    }
    tracing::debug!(account = %account_id, "account stored");
    Ok(())
  }

  async fn get_account(&self, account_id: &str) -> Result<Option<AccountEntry>> {
    let id = account_id.to_owned();

    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE account_id = ?1"),
              rusqlite::params![id],
              RawAccount::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccount::into_entry).transpose()
  }

  async fn list_accounts(&self) -> Result<Vec<AccountEntry>> {
    let raws: Vec<RawAccount> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, account_id"
        ))?;
        let rows = stmt
          .query_map([], RawAccount::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccount::into_entry).collect()
  }

  async fn save_token(&self, account_id: &str, token: &TokenState) -> Result<()> {
    let json = encode_token(token)?;
    self
      .update_column("UPDATE accounts SET token_json = ?1 WHERE account_id = ?2", account_id, json)
      .await
  }

  async fn save_options(&self, account_id: &str, options: &MonitorOptions) -> Result<()> {
    let json = encode_options(options)?;
    self
      .update_column(
        "UPDATE accounts SET options_json = ?1 WHERE account_id = ?2",
        account_id,
        json,
      )
      .await
  }

  async fn remove_account(&self, account_id: &str) -> Result<bool> {
    let id = account_id.to_owned();
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM accounts WHERE account_id = ?1", rusqlite::params![id])?)
      })
      .await?;
    if removed > 0 {
      tracing::debug!(account = %account_id, "account removed");
    }
    Ok(removed > 0)
  }
}
