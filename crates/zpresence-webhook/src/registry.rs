//! Per-account webhook ingress registration.
//!
//! Every account shares the one webhook route. An inbound request is handed
//! to the account whose verification token it carries; accounts are added
//! when their context starts and removed on teardown.

use std::sync::{Arc, PoisonError, RwLock};

use zpresence_core::event::EventSink;

use crate::auth::Verifier;

struct Ingress {
  account_id: String,
  verifier:   Verifier,
  sink:       Arc<dyn EventSink>,
}

/// Shared, cloneable table of registered ingresses.
#[derive(Clone, Default)]
pub struct WebhookRegistry {
  ingresses: Arc<RwLock<Vec<Ingress>>>,
}

impl WebhookRegistry {
  pub fn new() -> Self { Self::default() }

  /// Route deliveries carrying `verification_token` to `sink`. Replaces any
  /// earlier registration for the same account.
  pub fn register(
    &self,
    account_id: impl Into<String>,
    verification_token: &str,
    sink: Arc<dyn EventSink>,
  ) {
    let account_id = account_id.into();
    let mut ingresses = self.ingresses.write().unwrap_or_else(PoisonError::into_inner);
    ingresses.retain(|i| i.account_id != account_id);
    tracing::debug!(account = %account_id, "webhook ingress registered");
    ingresses.push(Ingress {
      account_id,
      verifier: Verifier::new(verification_token),
      sink,
    });
  }

  /// Stop routing deliveries to `account_id`. Returns `false` if it was not
  /// registered.
  pub fn unregister(&self, account_id: &str) -> bool {
    let mut ingresses = self.ingresses.write().unwrap_or_else(PoisonError::into_inner);
    let before = ingresses.len();
    ingresses.retain(|i| i.account_id != account_id);
    before != ingresses.len()
  }

  pub fn is_registered(&self, account_id: &str) -> bool {
    self
      .ingresses
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .any(|i| i.account_id == account_id)
  }

  /// Find the account whose token matches `presented`.
  ///
  /// Every registered verifier is checked so the time taken does not depend
  /// on which account (if any) matched.
  pub(crate) fn route(&self, presented: &str) -> Option<(String, Arc<dyn EventSink>)> {
    let ingresses = self.ingresses.read().unwrap_or_else(PoisonError::into_inner);
    let mut matched = None;
    for ingress in ingresses.iter() {
      if ingress.verifier.verify(presented) && matched.is_none() {
        matched = Some((ingress.account_id.clone(), ingress.sink.clone()));
      }
    }
    matched
  }
}
