//! Account identity, OAuth credentials and token state.
//!
//! An account is one Zoom user monitored by this process. Its credentials are
//! fixed at configuration time; its token pair is rotated by the token
//! manager and written back to the [`ConfigStore`](crate::store::ConfigStore)
//! after every refresh.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, contact::MonitorOptions};

/// Tokens expiring within this many seconds are treated as already expired.
pub const EXPIRY_MARGIN_SECS: i64 = 20;

/// Upper bound on a granted token lifetime; larger `expires_in` values are
/// clamped to it.
pub const MAX_EXPIRES_IN_SECS: i64 = 365 * 24 * 60 * 60;

// ─── Credentials ─────────────────────────────────────────────────────────────

/// OAuth client credentials plus the webhook verification token issued by
/// the Zoom marketplace app.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
  pub client_id:          String,
  pub client_secret:      String,
  pub verification_token: String,
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("client_id", &self.client_id)
      .field("client_secret", &"<redacted>")
      .field("verification_token", &"<redacted>")
      .finish()
  }
}

// ─── Token state ─────────────────────────────────────────────────────────────

/// The current access/refresh token pair.
///
/// Replaced wholesale on every refresh; never mutated field by field.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
  pub access_token:  String,
  pub refresh_token: Option<String>,
  pub expires_at:    DateTime<Utc>,
}

impl TokenState {
  /// Build a token state from a grant response's relative `expires_in`.
  pub fn from_expires_in(
    access_token: String,
    refresh_token: Option<String>,
    expires_in_secs: i64,
    now: DateTime<Utc>,
  ) -> Self {
    let lifetime = TimeDelta::seconds(expires_in_secs.clamp(0, MAX_EXPIRES_IN_SECS));
    let expires_at = now.checked_add_signed(lifetime).unwrap_or(now);
    Self { access_token, refresh_token, expires_at }
  }

  /// `true` if the token is expired, or will be within
  /// [`EXPIRY_MARGIN_SECS`], at `now`.
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now + TimeDelta::seconds(EXPIRY_MARGIN_SECS)
  }
}

impl fmt::Debug for TokenState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TokenState")
      .field("access_token", &"<redacted>")
      .field("has_refresh_token", &self.refresh_token.is_some())
      .field("expires_at", &self.expires_at)
      .finish()
  }
}

// ─── Account entry ───────────────────────────────────────────────────────────

/// Everything persisted about one configured account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountEntry {
  /// `zoom_<slug>` derived from `name`; unique per store.
  pub account_id:  String,
  pub name:        String,
  pub credentials: Credentials,
  pub token:       Option<TokenState>,
  pub options:     MonitorOptions,
  pub created_at:  DateTime<Utc>,
}

impl AccountEntry {
  /// Create a fresh entry with default options.
  pub fn new(
    name: impl Into<String>,
    credentials: Credentials,
    token: Option<TokenState>,
  ) -> Result<Self> {
    let name = name.into();
    Ok(Self {
      account_id: account_id_for(&name)?,
      name,
      credentials,
      token,
      options: MonitorOptions::default(),
      created_at: Utc::now(),
    })
  }
}

/// Derive the stable account identifier for a user-chosen display name.
pub fn account_id_for(name: &str) -> Result<String> {
  let slug = slugify(name);
  if slug.is_empty() {
    return Err(Error::InvalidAccountName(name.to_string()));
  }
  Ok(format!("zoom_{slug}"))
}

/// Transliterate to lowercase ASCII, then join the alphanumeric runs with
/// `_`.
fn slugify(name: &str) -> String { slug::slugify(name).replace('-', "_") }
