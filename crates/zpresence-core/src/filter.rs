//! Contact filter engine: turns a fetched contact list plus the user's
//! choices into the set of contact ids whose presence is monitored.
//!
//! Everything here is pure. The same inputs always produce the same output.

use std::collections::{BTreeMap, BTreeSet};

use crate::contact::{Contact, ContactType, MonitorMode};

/// Outcome of resolving a monitor set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorResolution {
  /// The resolved contact ids.
  Resolved(BTreeSet<String>),
  /// None of the fetched contacts belong to the chosen types. The caller
  /// should show a dedicated step instead of an empty selection list.
  NoContactsAvailable,
}

/// Choices presented to the user: display label → contact ids carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOptions {
  Available(BTreeMap<String, Vec<String>>),
  NoContactsAvailable,
}

/// Display label for a contact. When more than one contact type is in play
/// the type is prefixed so identical names from different lists stay
/// distinguishable.
pub fn contact_label(contact: &Contact, multiple_types: bool) -> String {
  if multiple_types {
    format!("[{}] {}", contact.contact_type, contact.display_name)
  } else {
    contact.display_name.clone()
  }
}

fn considered<'a>(
  contacts: &'a [Contact],
  contact_types: &'a BTreeSet<ContactType>,
) -> impl Iterator<Item = &'a Contact> + 'a {
  contacts
    .iter()
    .filter(move |c| contact_types.contains(&c.contact_type))
}

/// Build the sorted label list offered for selection.
pub fn selection_options(
  contacts: &[Contact],
  contact_types: &BTreeSet<ContactType>,
) -> SelectionOptions {
  let multiple = contact_types.len() > 1;
  let mut labels: BTreeMap<String, Vec<String>> = BTreeMap::new();
  for contact in considered(contacts, contact_types) {
    labels
      .entry(contact_label(contact, multiple))
      .or_default()
      .push(contact.id.clone());
  }
  if labels.is_empty() {
    SelectionOptions::NoContactsAvailable
  } else {
    SelectionOptions::Available(labels)
  }
}

/// Resolve the monitored id set.
///
/// A selection entry picks a contact when it equals the contact's label, its
/// bare display name, or its id.
pub fn resolve_monitor_set(
  contacts: &[Contact],
  contact_types: &BTreeSet<ContactType>,
  mode: MonitorMode,
  selection: &BTreeSet<String>,
) -> MonitorResolution {
  let multiple = contact_types.len() > 1;
  let mut any = false;
  let mut ids = BTreeSet::new();

  for contact in considered(contacts, contact_types) {
    any = true;
    let picked = selection.contains(&contact.id)
      || selection.contains(&contact.display_name)
      || selection.contains(&contact_label(contact, multiple));
    let keep = match mode {
      MonitorMode::Include => picked,
      MonitorMode::Exclude => !picked,
    };
    if keep {
      ids.insert(contact.id.clone());
    }
  }

  if any {
    MonitorResolution::Resolved(ids)
  } else {
    MonitorResolution::NoContactsAvailable
  }
}
