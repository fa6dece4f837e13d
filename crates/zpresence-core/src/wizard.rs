//! The monitoring-options wizard as an explicit state machine.
//!
//! ```text
//! ChooseContactTypes ──types──▶ LoadingContacts ──contacts──▶ ChooseContacts ──selection──▶ Finished
//!        │ (none)                      │ (none of the chosen types)
//!        ▼                             ▼
//!     Finished                     NoContacts ──acknowledge──▶ Finished
//! ```
//!
//! The wizard performs no I/O. When it reaches [`WizardStep::LoadingContacts`]
//! the driver fetches the contact list and feeds it back with
//! [`WizardInput::ContactsLoaded`].

use std::collections::BTreeSet;

use thiserror::Error;

use crate::{
  contact::{Contact, ContactType, MonitorMode, MonitorOptions},
  filter::{MonitorResolution, SelectionOptions, resolve_monitor_set, selection_options},
};

// ─── Steps and inputs ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStep {
  ChooseContactTypes {
    default: BTreeSet<ContactType>,
  },
  LoadingContacts {
    contact_types: BTreeSet<ContactType>,
  },
  ChooseContacts {
    /// Sorted display labels to choose from.
    labels:            Vec<String>,
    default_mode:      MonitorMode,
    default_selection: BTreeSet<String>,
  },
  NoContacts,
  /// `None` means the user chose no contact types and the stored options
  /// should be left alone.
  Finished(Option<MonitorOptions>),
}

impl WizardStep {
  fn name(&self) -> &'static str {
    match self {
      WizardStep::ChooseContactTypes { .. } => "choose_contact_types",
      WizardStep::LoadingContacts { .. } => "loading_contacts",
      WizardStep::ChooseContacts { .. } => "choose_contacts",
      WizardStep::NoContacts => "no_contacts",
      WizardStep::Finished(_) => "finished",
    }
  }
}

#[derive(Debug, Clone)]
pub enum WizardInput {
  ContactTypes(BTreeSet<ContactType>),
  ContactsLoaded(Vec<Contact>),
  Selection {
    mode:      MonitorMode,
    selection: BTreeSet<String>,
  },
  Acknowledge,
}

impl WizardInput {
  fn name(&self) -> &'static str {
    match self {
      WizardInput::ContactTypes(_) => "contact_types",
      WizardInput::ContactsLoaded(_) => "contacts_loaded",
      WizardInput::Selection { .. } => "selection",
      WizardInput::Acknowledge => "acknowledge",
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
  #[error("input {input} is not accepted at step {step}")]
  UnexpectedInput {
    step:  &'static str,
    input: &'static str,
  },

  #[error("unknown contacts selected: {0:?}")]
  UnknownLabels(Vec<String>),
}

// ─── Wizard ──────────────────────────────────────────────────────────────────

pub struct OptionsWizard {
  step:          WizardStep,
  previous:      MonitorOptions,
  contact_types: BTreeSet<ContactType>,
  contacts:      Vec<Contact>,
}

impl OptionsWizard {
  /// Start a wizard pre-filled from the currently stored options.
  pub fn new(previous: MonitorOptions) -> Self {
    Self {
      step: WizardStep::ChooseContactTypes {
        default: previous.contact_types.clone(),
      },
      previous,
      contact_types: BTreeSet::new(),
      contacts: Vec::new(),
    }
  }

  pub fn step(&self) -> &WizardStep { &self.step }

  pub fn is_finished(&self) -> bool { matches!(self.step, WizardStep::Finished(_)) }

  /// Apply one input. On error the wizard stays at its current step.
  pub fn advance(&mut self, input: WizardInput) -> Result<&WizardStep, WizardError> {
    let next = match (&self.step, input) {
      (WizardStep::ChooseContactTypes { .. }, WizardInput::ContactTypes(types)) => {
        if types.is_empty() {
          WizardStep::Finished(None)
        } else {
          self.contact_types = types.clone();
          WizardStep::LoadingContacts { contact_types: types }
        }
      }

      (WizardStep::LoadingContacts { .. }, WizardInput::ContactsLoaded(contacts)) => {
        let step = match selection_options(&contacts, &self.contact_types) {
          SelectionOptions::Available(labels) => {
            let default_selection = self
              .previous
              .contacts_to_include_or_exclude
              .iter()
              .filter(|l| labels.contains_key(*l))
              .cloned()
              .collect();
            WizardStep::ChooseContacts {
              labels: labels.into_keys().collect(),
              default_mode: self.previous.include_or_exclude,
              default_selection,
            }
          }
          SelectionOptions::NoContactsAvailable => WizardStep::NoContacts,
        };
        self.contacts = contacts;
        step
      }

      (WizardStep::ChooseContacts { labels, .. }, WizardInput::Selection { mode, selection }) => {
        let unknown: Vec<String> = selection
          .iter()
          .filter(|s| labels.binary_search(*s).is_err())
          .cloned()
          .collect();
        if !unknown.is_empty() {
          return Err(WizardError::UnknownLabels(unknown));
        }
        let ids = match resolve_monitor_set(&self.contacts, &self.contact_types, mode, &selection) {
          MonitorResolution::Resolved(ids) => ids,
          MonitorResolution::NoContactsAvailable => BTreeSet::new(),
        };
        WizardStep::Finished(Some(MonitorOptions {
          contact_types:                  self.contact_types.clone(),
          include_or_exclude:             mode,
          contacts_to_include_or_exclude: selection,
          contacts_to_monitor:            ids,
        }))
      }

      (WizardStep::NoContacts, WizardInput::Acknowledge) => {
        WizardStep::Finished(Some(MonitorOptions {
          contact_types: self.contact_types.clone(),
          ..MonitorOptions::default()
        }))
      }

      (step, input) => {
        return Err(WizardError::UnexpectedInput {
          step:  step.name(),
          input: input.name(),
        });
      }
    };

    self.step = next;
    Ok(&self.step)
  }
}
