//! Single-flight profile polling.
//!
//! [`PollCoordinator::refresh`] is the only way a fetch starts. A caller that
//! arrives while one is already running attaches to it instead of starting
//! another, so however many callers (interval ticks, manual refreshes) pile
//! up, the source sees one request and they all get the same result.
//!
//! The fetch itself runs on its own task. Waiters select between its result
//! and the coordinator's cancellation token, so teardown releases them at
//! once; the fetch is left to finish and its result is thrown away.

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use thiserror::Error;
use tokio::{
  sync::watch,
  task::JoinHandle,
  time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use zpresence_core::profile::{ProfileSnapshot, ProfileSource};

// ─── Public types ─────────────────────────────────────────────────────────────

/// Why a [`PollCoordinator::refresh`] call produced no snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
  #[error("profile fetch failed: {message}")]
  Fetch {
    message:         String,
    /// The credentials were rejected; polling cannot recover on its own.
    reauth_required: bool,
  },
  #[error("polling was cancelled")]
  Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
  Idle,
  Fetching,
}

/// What subscribers see: the latest snapshot plus the last failure, if the
/// most recent fetch failed.
#[derive(Debug, Clone, Default)]
pub struct PollStatus {
  pub snapshot:        Option<Arc<ProfileSnapshot>>,
  pub last_error:      Option<PollError>,
  pub reauth_required: bool,
}

type FetchResult = Result<Arc<ProfileSnapshot>, PollError>;
type InFlight = watch::Receiver<Option<FetchResult>>;

// ─── Coordinator ──────────────────────────────────────────────────────────────

/// Keeps one [`ProfileSource`]'s snapshot fresh. Cheap to clone; clones share
/// state.
pub struct PollCoordinator<S> {
  inner: Arc<Inner<S>>,
}

impl<S> Clone for PollCoordinator<S> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

struct Inner<S> {
  source:   Arc<S>,
  inflight: Mutex<Option<InFlight>>,
  status:   watch::Sender<PollStatus>,
  cancel:   CancellationToken,
}

impl<S: ProfileSource + 'static> PollCoordinator<S> {
  pub fn new(source: Arc<S>, cancel: CancellationToken) -> Self {
    let (status, _) = watch::channel(PollStatus::default());
    Self {
      inner: Arc::new(Inner {
        source,
        inflight: Mutex::new(None),
        status,
        cancel,
      }),
    }
  }

  /// Fetch a fresh snapshot, or join the fetch already in progress.
  ///
  /// On failure the previously cached snapshot is kept.
  pub async fn refresh(&self) -> Result<Arc<ProfileSnapshot>, PollError> {
    if self.inner.cancel.is_cancelled() {
      return Err(PollError::Cancelled);
    }
    let mut rx = self.attach_or_start();

    tokio::select! {
      _ = self.inner.cancel.cancelled() => Err(PollError::Cancelled),
      done = rx.wait_for(Option::is_some) => match done {
        Ok(result) => result.clone().unwrap_or(Err(PollError::Cancelled)),
        // The fetch task went away without reporting.
        Err(_) => Err(PollError::Cancelled),
      },
    }
  }

  /// The most recent successful snapshot.
  pub fn snapshot(&self) -> Option<Arc<ProfileSnapshot>> {
    self.inner.status.borrow().snapshot.clone()
  }

  pub fn status(&self) -> PollStatus { self.inner.status.borrow().clone() }

  pub fn subscribe(&self) -> watch::Receiver<PollStatus> { self.inner.status.subscribe() }

  pub fn state(&self) -> PollState {
    if self.live_inflight().is_some() { PollState::Fetching } else { PollState::Idle }
  }

  /// Stop polling. Pending and future `refresh` calls return
  /// [`PollError::Cancelled`].
  pub fn cancel(&self) { self.inner.cancel.cancel(); }

  pub fn is_cancelled(&self) -> bool { self.inner.cancel.is_cancelled() }

  /// Call [`refresh`](Self::refresh) every `period`, starting one period from
  /// now, until cancelled. Ticks that fall due while a fetch is still running
  /// are skipped rather than queued, and the next one comes a full `period`
  /// after that fetch completes.
  pub fn spawn_interval(&self, period: Duration) -> JoinHandle<()> {
    let this = self.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval_at(Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

      loop {
        tokio::select! {
          _ = this.inner.cancel.cancelled() => {
            tracing::debug!("poll interval stopped");
            break;
          }
          _ = interval.tick() => {
            // Outcomes are logged and recorded by the fetch task.
            let _ = this.refresh().await;
            interval.reset();
          }
        }
      }
    })
  }

  fn live_inflight(&self) -> Option<InFlight> {
    let slot = self.inner.inflight.lock().unwrap_or_else(PoisonError::into_inner);
    // A closed channel means the fetch task died before reporting.
    slot.as_ref().filter(|rx| rx.has_changed().is_ok()).cloned()
  }

  fn attach_or_start(&self) -> InFlight {
    let mut slot = self.inner.inflight.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(rx) = slot.as_ref().filter(|rx| rx.has_changed().is_ok()) {
      return rx.clone();
    }

    let (tx, rx) = watch::channel(None);
    *slot = Some(rx.clone());
    drop(slot);

    let inner = self.inner.clone();
    tokio::spawn(async move { inner.fetch(tx).await });
    rx
  }
}

impl<S: ProfileSource> Inner<S> {
  async fn fetch(&self, tx: watch::Sender<Option<FetchResult>>) {
    let result = self.source.fetch_profile().await;

    // Later callers start a new fetch from here on.
    self.inflight.lock().unwrap_or_else(PoisonError::into_inner).take();

    if self.cancel.is_cancelled() {
      tracing::debug!("discarding profile fetched after teardown");
      return;
    }

    let outcome = match result {
      Ok(snapshot) => {
        let snapshot = Arc::new(snapshot);
        tracing::debug!(
          profile = %snapshot.id,
          status = snapshot.presence_status.as_deref().unwrap_or("-"),
          "profile refreshed"
        );
        self.status.send_modify(|s| {
          s.snapshot = Some(snapshot.clone());
          s.last_error = None;
          s.reauth_required = false;
        });
        Ok(snapshot)
      }
      Err(e) => {
        let reauth_required = S::requires_reauth(&e);
        if reauth_required {
          tracing::error!(error = %e, "profile poll rejected; account must be re-authorized");
        } else {
          tracing::warn!(error = %e, "profile poll failed; retrying on next tick");
        }
        let err = PollError::Fetch { message: e.to_string(), reauth_required };
        self.status.send_modify(|s| {
          s.last_error = Some(err.clone());
          s.reauth_required = reauth_required;
        });
        Err(err)
      }
    };

    let _ = tx.send(Some(outcome));
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
