//! Webhook events and the publishing seam between ingress and bus.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event name Zoom sends when a user's presence changes.
pub const PRESENCE_STATUS_UPDATED: &str = "user.presence_status_updated";

/// Name of the internal bus topic webhook events are published under.
pub const WEBHOOK_TOPIC: &str = "zoom_webhook";

/// Path to the subject id inside an event body.
pub const PRESENCE_ID_PATH: [&str; 3] = ["payload", "object", "id"];

/// Path to the presence status inside an event body.
pub const PRESENCE_STATUS_PATH: [&str; 3] = ["payload", "object", "presence_status"];

/// A validated inbound webhook delivery. Lives only for the duration of
/// request handling and bus delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
  pub event_name: String,
  pub payload:    Map<String, Value>,
}

impl WebhookEvent {
  pub fn new(event_name: impl Into<String>, payload: Map<String, Value>) -> Self {
    Self { event_name: event_name.into(), payload }
  }

  /// Look up a string at `path`, where the first segment may be `"payload"`
  /// (the event body is `{"event": ..., "payload": {...}}`).
  ///
  /// Returns `None` if any segment is missing or the leaf is not a string.
  pub fn str_at(&self, path: &[&str]) -> Option<&str> {
    let rest = match path.split_first() {
      Some((&"payload", rest)) => rest,
      _ => path,
    };
    let (first, rest) = rest.split_first()?;
    let mut cur = self.payload.get(*first)?;
    for key in rest {
      cur = cur.get(*key)?;
    }
    cur.as_str()
  }
}

/// Something webhook events can be handed to without waiting.
///
/// Implementations must return promptly: the HTTP response to Zoom is not
/// sent until `publish` returns.
pub trait EventSink: Send + Sync {
  fn publish(&self, event: WebhookEvent);
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn event(body: Value) -> WebhookEvent {
    let Value::Object(payload) = body else { panic!("object expected") };
    WebhookEvent::new(PRESENCE_STATUS_UPDATED, payload)
  }

  #[test]
  fn reads_nested_strings() {
    let ev = event(json!({"object": {"id": "abc", "presence_status": "Away"}}));
    assert_eq!(ev.str_at(&PRESENCE_ID_PATH), Some("abc"));
    assert_eq!(ev.str_at(&PRESENCE_STATUS_PATH), Some("Away"));
  }

  #[test]
  fn missing_or_non_string_leaves_are_none() {
    let ev = event(json!({"object": {"id": 42}}));
    assert_eq!(ev.str_at(&PRESENCE_ID_PATH), None);
    assert_eq!(ev.str_at(&PRESENCE_STATUS_PATH), None);

    let ev = event(json!({"other": true}));
    assert_eq!(ev.str_at(&PRESENCE_ID_PATH), None);
  }
}
