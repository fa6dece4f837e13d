//! Zoom chat contacts and the persisted monitoring options.

use std::{collections::BTreeSet, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// Which of the user's contact lists a contact came from.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactType {
  Company,
  External,
}

impl ContactType {
  pub const ALL: [ContactType; 2] = [ContactType::Company, ContactType::External];

  /// Parse a user-supplied type name, ignoring case and surrounding spaces.
  pub fn parse(s: &str) -> Result<Self> {
    ContactType::from_str(&s.trim().to_ascii_lowercase())
      .map_err(|_| Error::UnknownContactType(s.to_string()))
  }
}

/// A single entry from a contact list. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub id:           String,
  pub display_name: String,
  pub contact_type: ContactType,
}

/// Whether the selected contacts are the ones to watch or the ones to skip.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MonitorMode {
  #[default]
  Include,
  Exclude,
}

/// The per-account monitoring configuration produced by the options wizard.
///
/// `contacts_to_monitor` is the resolved id set; the other fields are kept so
/// the wizard can offer the previous answers as defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorOptions {
  #[serde(default)]
  pub contact_types:                  BTreeSet<ContactType>,
  #[serde(default)]
  pub include_or_exclude:             MonitorMode,
  #[serde(default)]
  pub contacts_to_include_or_exclude: BTreeSet<String>,
  #[serde(default)]
  pub contacts_to_monitor:            BTreeSet<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn contact_type_parses_case_insensitively() {
    assert_eq!(ContactType::parse(" Company ").unwrap(), ContactType::Company);
    assert_eq!(ContactType::parse("EXTERNAL").unwrap(), ContactType::External);
    assert!(matches!(
      ContactType::parse("partner"),
      Err(Error::UnknownContactType(_))
    ));
  }

  #[test]
  fn options_deserialise_with_missing_fields() {
    let opts: MonitorOptions =
      serde_json::from_str(r#"{"contact_types":["external"]}"#).unwrap();
    assert_eq!(opts.include_or_exclude, MonitorMode::Include);
    assert!(opts.contact_types.contains(&ContactType::External));
    assert!(opts.contacts_to_monitor.is_empty());
  }
}
