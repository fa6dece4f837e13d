//! In-process webhook event bus backed by a `tokio::sync::broadcast` channel.
//!
//! Each account owns one [`EventBus`]. The webhook ingress publishes into it
//! and the account's presence dispatcher consumes from it.

use tokio::sync::broadcast;
use zpresence_core::event::{EventSink, WEBHOOK_TOPIC, WebhookEvent};

/// Default buffer capacity for the broadcast channel.
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out bus for one account's webhook events.
pub struct EventBus {
  topic:  &'static str,
  sender: broadcast::Sender<WebhookEvent>,
}

impl EventBus {
  /// Create a bus with a specific channel capacity.
  ///
  /// When the buffer is full the oldest unconsumed events are dropped and
  /// slow receivers observe `RecvError::Lagged`.
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self { topic: WEBHOOK_TOPIC, sender }
  }

  pub fn topic(&self) -> &'static str { self.topic }

  /// Subscribe to every event published from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<WebhookEvent> { self.sender.subscribe() }

  pub fn subscriber_count(&self) -> usize { self.sender.receiver_count() }
}

impl Default for EventBus {
  fn default() -> Self { Self::new(DEFAULT_CAPACITY) }
}

impl EventSink for EventBus {
  fn publish(&self, event: WebhookEvent) {
    // Only fails when nobody is subscribed.
    if self.sender.send(event).is_err() {
      tracing::debug!(topic = self.topic, "event published with no subscribers");
    }
  }
}
