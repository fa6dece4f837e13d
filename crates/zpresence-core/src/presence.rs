//! Presence records and the binary occupancy view derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Default presence status that reads as "not occupied".
pub const DEFAULT_OFF_STATUS: &str = "Available";

/// Latest known presence of one monitored subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
  /// Subject id exactly as it appeared in the most recent event.
  pub subject_id:      String,
  /// Zoom presence status, e.g. `Do_Not_Disturb`, exactly as received.
  pub status:          String,
  pub last_updated_at: DateTime<Utc>,
}

impl PresenceRecord {
  pub fn occupancy(&self, off_status: &str) -> Occupancy {
    Occupancy::from_status(Some(&self.status), off_status)
  }
}

/// Two-state collapse of Zoom's presence states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Occupancy {
  On,
  Off,
}

impl Occupancy {
  /// `Off` when no status is known or it equals `off_status` ignoring case;
  /// `On` for every other status.
  pub fn from_status(status: Option<&str>, off_status: &str) -> Self {
    match status {
      None => Occupancy::Off,
      Some(s) if s.is_empty() || s.eq_ignore_ascii_case(off_status) => Occupancy::Off,
      Some(_) => Occupancy::On,
    }
  }
}
