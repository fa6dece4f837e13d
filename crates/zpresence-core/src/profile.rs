//! Profile snapshots and the source abstraction the poll coordinator drives.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An immutable copy of the user's profile as of `retrieved_at`.
///
/// Replaced wholesale on every successful poll and shared by reference;
/// consumers never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
  pub id:              String,
  pub presence_status: Option<String>,
  pub retrieved_at:    DateTime<Utc>,
  /// The full profile object as returned by the API.
  pub raw_fields:      Map<String, Value>,
}

impl ProfileSnapshot {
  /// Build a snapshot from a raw profile object. Returns `None` when the
  /// object carries no string `id`.
  pub fn from_raw(raw_fields: Map<String, Value>, retrieved_at: DateTime<Utc>) -> Option<Self> {
    let id = raw_fields.get("id")?.as_str()?.to_string();
    let presence_status = raw_fields
      .get("presence_status")
      .and_then(Value::as_str)
      .map(str::to_string);
    Some(Self { id, presence_status, retrieved_at, raw_fields })
  }
}

/// Anything that can produce a fresh [`ProfileSnapshot`].
///
/// Implemented by the HTTP API client; tests substitute in-memory fakes.
pub trait ProfileSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn fetch_profile(&self) -> impl Future<Output = Result<ProfileSnapshot, Self::Error>> + Send + '_;

  /// Whether `error` means the stored credentials are no longer accepted and
  /// a human must re-authorize. Such failures are reported loudly.
  fn requires_reauth(_error: &Self::Error) -> bool { false }
}
