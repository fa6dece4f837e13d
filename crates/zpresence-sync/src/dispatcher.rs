//! Turns webhook events into per-subject presence records.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Arc, PoisonError, RwLock,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::Utc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use zpresence_core::{
  event::{PRESENCE_ID_PATH, PRESENCE_STATUS_PATH, PRESENCE_STATUS_UPDATED, WebhookEvent},
  presence::PresenceRecord,
};

/// Callback invoked with every applied presence update.
pub type Observer = Arc<dyn Fn(&PresenceRecord) + Send + Sync>;

/// Returned by [`PresenceDispatcher::add_observer`]; pass it back to
/// [`PresenceDispatcher::remove_observer`] to stop notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

/// Applies presence events for a set of monitored subjects.
///
/// Subject ids are matched case-insensitively. Records are keyed by the
/// lowercased id but keep the spelling of the most recent event.
#[derive(Default)]
pub struct PresenceDispatcher {
  monitored:     RwLock<HashSet<String>>,
  records:       RwLock<HashMap<String, PresenceRecord>>,
  observers:     RwLock<Vec<(ObserverHandle, Observer)>>,
  next_observer: AtomicU64,
}

impl PresenceDispatcher {
  pub fn new<I, T>(monitored: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
  {
    let dispatcher = Self::default();
    for id in monitored {
      dispatcher.monitor(id.as_ref());
    }
    dispatcher
  }

  /// Start tracking `subject_id`. Returns `false` if it was already tracked.
  pub fn monitor(&self, subject_id: &str) -> bool {
    let inserted = write(&self.monitored).insert(subject_id.to_lowercase());
    if inserted {
      tracing::debug!(subject = subject_id, "monitoring subject");
    }
    inserted
  }

  pub fn is_monitored(&self, subject_id: &str) -> bool {
    read(&self.monitored).contains(&subject_id.to_lowercase())
  }

  pub fn monitored_count(&self) -> usize { read(&self.monitored).len() }

  /// Latest record for `subject_id`, if any event has been applied.
  pub fn record(&self, subject_id: &str) -> Option<PresenceRecord> {
    read(&self.records).get(&subject_id.to_lowercase()).cloned()
  }

  pub fn records(&self) -> Vec<PresenceRecord> {
    let mut records: Vec<_> = read(&self.records).values().cloned().collect();
    records.sort_by(|a, b| a.subject_id.cmp(&b.subject_id));
    records
  }

  pub fn add_observer(
    &self,
    observer: impl Fn(&PresenceRecord) + Send + Sync + 'static,
  ) -> ObserverHandle {
    let handle = ObserverHandle(self.next_observer.fetch_add(1, Ordering::Relaxed));
    write(&self.observers).push((handle, Arc::new(observer)));
    handle
  }

  /// Returns `false` if `handle` was already removed.
  pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
    let mut observers = write(&self.observers);
    let before = observers.len();
    observers.retain(|(h, _)| *h != handle);
    before != observers.len()
  }

  /// Apply one event. Returns the resulting record when the event was a
  /// presence update for a monitored subject, `None` when it was ignored.
  pub fn handle(&self, event: &WebhookEvent) -> Option<PresenceRecord> {
    if event.event_name != PRESENCE_STATUS_UPDATED {
      tracing::trace!(event = %event.event_name, "ignoring event");
      return None;
    }
    let (Some(subject_id), Some(status)) = (
      event.str_at(&PRESENCE_ID_PATH),
      event.str_at(&PRESENCE_STATUS_PATH),
    ) else {
      tracing::debug!("presence event without string id and status; dropped");
      return None;
    };

    let key = subject_id.to_lowercase();
    if !read(&self.monitored).contains(&key) {
      tracing::trace!(subject = subject_id, "presence event for unmonitored subject");
      return None;
    }

    let record = {
      let mut records = write(&self.records);
      let record = records.entry(key).or_insert_with(|| PresenceRecord {
        subject_id:      subject_id.to_string(),
        status:          String::new(),
        last_updated_at: Utc::now(),
      });
      // A replayed status leaves the record as it was.
      if record.status != status || record.subject_id != subject_id {
        record.subject_id = subject_id.to_string();
        record.status = status.to_string();
        record.last_updated_at = Utc::now();
      }
      record.clone()
    };

    tracing::debug!(subject = %record.subject_id, status = %record.status, "presence updated");
    self.notify(&record);
    Some(record)
  }

  /// Consume `rx` in order until it closes or `cancel` fires.
  pub async fn run(
    self: Arc<Self>,
    mut rx: broadcast::Receiver<WebhookEvent>,
    cancel: CancellationToken,
  ) {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        received = rx.recv() => match received {
          Ok(event) => {
            self.handle(&event);
          }
          Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "presence dispatcher fell behind; events dropped");
          }
          Err(RecvError::Closed) => break,
        },
      }
    }
    tracing::debug!("presence dispatcher stopped");
  }

  fn notify(&self, record: &PresenceRecord) {
    // Observers run outside the lock so they may (un)register others.
    let observers: Vec<Observer> = read(&self.observers).iter().map(|(_, o)| o.clone()).collect();
    for observer in observers {
      observer(record);
    }
  }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
  lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
  lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use serde_json::{Value, json};

  use super::*;

  fn event(name: &str, body: Value) -> WebhookEvent {
    let Value::Object(payload) = body else { panic!("object expected") };
    WebhookEvent::new(name, payload)
  }

  fn presence(id: &str, status: &str) -> WebhookEvent {
    event(
      PRESENCE_STATUS_UPDATED,
      json!({ "object": { "id": id, "presence_status": status } }),
    )
  }

  fn recorder(
    dispatcher: &PresenceDispatcher,
  ) -> (ObserverHandle, Arc<Mutex<Vec<PresenceRecord>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handle = dispatcher.add_observer(move |r| sink.lock().unwrap().push(r.clone()));
    (handle, seen)
  }

  #[test]
  fn updates_only_the_matching_subject_case_insensitively() {
    let dispatcher = PresenceDispatcher::new(["ABC", "other"]);
    let (_, seen) = recorder(&dispatcher);

    let record = dispatcher.handle(&presence("abc", "Do_Not_Disturb")).unwrap();
    assert_eq!(record.status, "Do_Not_Disturb");
    assert_eq!(dispatcher.record("ABC").unwrap().status, "Do_Not_Disturb");
    assert!(dispatcher.record("other").is_none());
    assert_eq!(seen.lock().unwrap().len(), 1);
  }

  #[test]
  fn replayed_status_renotifies_without_changing_the_record() {
    let dispatcher = PresenceDispatcher::new(["abc"]);
    let (_, seen) = recorder(&dispatcher);

    let first = dispatcher.handle(&presence("abc", "Away")).unwrap();
    let second = dispatcher.handle(&presence("abc", "Away")).unwrap();
    assert_eq!(first, second);
    assert_eq!(seen.lock().unwrap().len(), 2);

    let third = dispatcher.handle(&presence("abc", "Available")).unwrap();
    assert_eq!(third.status, "Available");
    assert_eq!(dispatcher.records(), vec![third]);
  }

  #[test]
  fn ignores_unmonitored_foreign_and_incomplete_events() {
    let dispatcher = PresenceDispatcher::new(["abc"]);
    let (_, seen) = recorder(&dispatcher);

    assert!(dispatcher.handle(&presence("xyz", "Away")).is_none());
    assert!(
      dispatcher
        .handle(&event("meeting.started", json!({ "object": { "id": "abc" } })))
        .is_none()
    );
    assert!(
      dispatcher
        .handle(&event(PRESENCE_STATUS_UPDATED, json!({ "object": { "id": "abc" } })))
        .is_none()
    );
    assert!(
      dispatcher
        .handle(&event(
          PRESENCE_STATUS_UPDATED,
          json!({ "object": { "id": 1, "presence_status": "Away" } })
        ))
        .is_none()
    );
    assert!(seen.lock().unwrap().is_empty());
    assert!(dispatcher.records().is_empty());
  }

  #[test]
  fn removed_observers_are_not_called() {
    let dispatcher = PresenceDispatcher::new(["abc"]);
    let (handle, seen) = recorder(&dispatcher);
    assert!(dispatcher.remove_observer(handle));
    assert!(!dispatcher.remove_observer(handle));

    dispatcher.handle(&presence("abc", "Away"));
    assert!(seen.lock().unwrap().is_empty());
  }

  #[test]
  fn monitor_adds_subjects_once() {
    let dispatcher = PresenceDispatcher::default();
    assert!(dispatcher.monitor("Owner"));
    assert!(!dispatcher.monitor("owner"));
    assert!(dispatcher.is_monitored("OWNER"));
    assert_eq!(dispatcher.monitored_count(), 1);
  }

  #[tokio::test]
  async fn run_applies_bus_events_in_order_until_cancelled() {
    let dispatcher = Arc::new(PresenceDispatcher::new(["abc"]));
    let (_, seen) = recorder(&dispatcher);
    let (tx, rx) = broadcast::channel(16);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(dispatcher.clone().run(rx, cancel.clone()));

    for status in ["Away", "Do_Not_Disturb", "Available"] {
      tx.send(presence("abc", status)).unwrap();
    }
    while seen.lock().unwrap().len() < 3 {
      tokio::task::yield_now().await;
    }
    let statuses: Vec<_> = seen.lock().unwrap().iter().map(|r| r.status.clone()).collect();
    assert_eq!(statuses, ["Away", "Do_Not_Disturb", "Available"]);

    cancel.cancel();
    task.await.unwrap();
  }
}
