//! Conversions between domain types and the plain-text SQLite columns.
//!
//! Timestamps are RFC 3339 strings; the token pair and monitoring options
//! are compact JSON.

use chrono::{DateTime, Utc};
use zpresence_core::{
  account::{AccountEntry, Credentials, TokenState},
  contact::MonitorOptions,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_token(token: &TokenState) -> Result<String> { Ok(serde_json::to_string(token)?) }

pub fn encode_options(options: &MonitorOptions) -> Result<String> {
  Ok(serde_json::to_string(options)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawAccount::from_row`].
pub const ACCOUNT_COLUMNS: &str = "account_id, name, client_id, client_secret, \
                                   verification_token, token_json, options_json, created_at";

/// Raw strings read directly from an `accounts` row.
pub struct RawAccount {
  pub account_id:         String,
  pub name:               String,
  pub client_id:          String,
  pub client_secret:      String,
  pub verification_token: String,
  pub token_json:         Option<String>,
  pub options_json:       String,
  pub created_at:         String,
}

impl RawAccount {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      account_id:         row.get(0)?,
      name:               row.get(1)?,
      client_id:          row.get(2)?,
      client_secret:      row.get(3)?,
      verification_token: row.get(4)?,
      token_json:         row.get(5)?,
      options_json:       row.get(6)?,
      created_at:         row.get(7)?,
    })
  }

  pub fn into_entry(self) -> Result<AccountEntry> {
    let token = self
      .token_json
      .as_deref()
      .map(serde_json::from_str::<TokenState>)
      .transpose()?;
    let options: MonitorOptions = serde_json::from_str(&self.options_json)?;

    Ok(AccountEntry {
      account_id: self.account_id,
      name: self.name,
      credentials: Credentials {
        client_id:          self.client_id,
        client_secret:      self.client_secret,
        verification_token: self.verification_token,
      },
      token,
      options,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
