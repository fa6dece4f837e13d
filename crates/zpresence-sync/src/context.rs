//! [`AccountContext`]: the runtime wiring for one configured account.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use zpresence_client::{OAuthEndpoints, TokenManager, ZoomApi, api::DEFAULT_BASE_URL};
use zpresence_core::{
  account::{AccountEntry, TokenState},
  store::ConfigStore,
};
use zpresence_webhook::WebhookRegistry;

use crate::{
  Result,
  bus::{self, EventBus},
  coordinator::{PollCoordinator, PollStatus},
  dispatcher::PresenceDispatcher,
};

/// Process-wide knobs shared by every account.
#[derive(Debug, Clone)]
pub struct SyncSettings {
  pub api_base_url:  String,
  pub endpoints:     OAuthEndpoints,
  pub poll_interval: Duration,
  pub bus_capacity:  usize,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      api_base_url:  DEFAULT_BASE_URL.to_string(),
      endpoints:     OAuthEndpoints::default(),
      poll_interval: Duration::from_secs(60),
      bus_capacity:  bus::DEFAULT_CAPACITY,
    }
  }
}

/// Everything one account runs while it is active.
///
/// Built by [`start`](Self::start) and dismantled by
/// [`teardown`](Self::teardown); nothing here outlives the context.
pub struct AccountContext {
  account_id:  String,
  tokens:      Arc<TokenManager>,
  coordinator: PollCoordinator<ZoomApi>,
  bus:         Arc<EventBus>,
  dispatcher:  Arc<PresenceDispatcher>,
  cancel:      CancellationToken,
  tasks:       Vec<JoinHandle<()>>,
}

impl AccountContext {
  /// Bring an account online.
  ///
  /// A failing initial profile fetch is logged and does not prevent the
  /// account from starting; the interval poll keeps retrying.
  pub async fn start<S>(
    entry: AccountEntry,
    settings: &SyncSettings,
    store: Arc<S>,
    registry: &WebhookRegistry,
  ) -> Result<Self>
  where
    S: ConfigStore + 'static,
  {
    let account_id = entry.account_id.clone();
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    let tokens = Arc::new(TokenManager::new(settings.endpoints.clone())?);
    tokens.register(entry.credentials.clone())?;
    tokens.seed(entry.token.clone());
    tasks.push(tokio::spawn(persist_tokens(
      account_id.clone(),
      tokens.subscribe(),
      store,
      cancel.child_token(),
    )));

    let api = ZoomApi::new(settings.api_base_url.clone(), tokens.clone())?;
    let coordinator = PollCoordinator::new(Arc::new(api), cancel.child_token());

    let bus = Arc::new(EventBus::new(settings.bus_capacity));
    let dispatcher = Arc::new(PresenceDispatcher::new(&entry.options.contacts_to_monitor));
    tasks.push(tokio::spawn(dispatcher.clone().run(bus.subscribe(), cancel.child_token())));
    tasks.push(tokio::spawn(track_owner(
      coordinator.subscribe(),
      dispatcher.clone(),
      cancel.child_token(),
    )));

    match coordinator.refresh().await {
      Ok(snapshot) => {
        tracing::info!(account = %account_id, profile = %snapshot.id, "account online")
      }
      Err(e) => {
        tracing::warn!(account = %account_id, error = %e, "initial profile fetch failed")
      }
    }
    tasks.push(coordinator.spawn_interval(settings.poll_interval));

    registry.register(account_id.clone(), &entry.credentials.verification_token, bus.clone());

    Ok(Self {
      account_id,
      tokens,
      coordinator,
      bus,
      dispatcher,
      cancel,
      tasks,
    })
  }

  pub fn account_id(&self) -> &str { &self.account_id }

  pub fn tokens(&self) -> &Arc<TokenManager> { &self.tokens }

  pub fn coordinator(&self) -> &PollCoordinator<ZoomApi> { &self.coordinator }

  pub fn bus(&self) -> &Arc<EventBus> { &self.bus }

  pub fn dispatcher(&self) -> &Arc<PresenceDispatcher> { &self.dispatcher }

  /// Take the account offline: stop accepting its webhooks, stop polling,
  /// and wait for its background tasks to exit.
  pub async fn teardown(self, registry: &WebhookRegistry) {
    registry.unregister(&self.account_id);
    self.cancel.cancel();
    for task in self.tasks {
      if let Err(e) = task.await {
        tracing::warn!(account = %self.account_id, error = %e, "account task ended abnormally");
      }
    }
    tracing::info!(account = %self.account_id, "account offline");
  }
}

/// Write every newly installed token pair back to the store.
async fn persist_tokens<S: ConfigStore>(
  account_id: String,
  mut rx: watch::Receiver<Option<TokenState>>,
  store: Arc<S>,
  cancel: CancellationToken,
) {
  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      changed = rx.changed() => {
        if changed.is_err() {
          break;
        }
        let token = rx.borrow_and_update().clone();
        let Some(token) = token else { continue };
        match store.save_token(&account_id, &token).await {
          Ok(()) => tracing::debug!(account = %account_id, "token persisted"),
          Err(e) => tracing::error!(account = %account_id, error = %e, "failed to persist token"),
        }
      }
    }
  }
}

/// Keep the account owner's own profile id monitored.
async fn track_owner(
  mut rx: watch::Receiver<PollStatus>,
  dispatcher: Arc<PresenceDispatcher>,
  cancel: CancellationToken,
) {
  loop {
    let owner = rx.borrow_and_update().snapshot.as_ref().map(|s| s.id.clone());
    if let Some(owner) = owner {
      dispatcher.monitor(&owner);
    }
    tokio::select! {
      _ = cancel.cancelled() => break,
      changed = rx.changed() => if changed.is_err() { break },
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{
    convert::Infallible,
    sync::{Mutex, atomic::{AtomicUsize, Ordering}},
  };

  use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
  };
  use chrono::Utc;
  use serde_json::{Value, json};
  use tokio::net::TcpListener;
  use zpresence_core::{
    account::Credentials,
    contact::MonitorOptions,
  };
  use zpresence_webhook::{WebhookState, handle_request};

  use super::*;

  /// Records saved tokens; everything else is a no-op.
  #[derive(Default)]
  struct MemoryStore {
    saved: Mutex<Vec<(String, TokenState)>>,
  }

  impl ConfigStore for MemoryStore {
    type Error = Infallible;

    async fn add_account(&self, _entry: &AccountEntry) -> Result<(), Infallible> { Ok(()) }

    async fn get_account(&self, _account_id: &str) -> Result<Option<AccountEntry>, Infallible> {
      Ok(None)
    }

    async fn list_accounts(&self) -> Result<Vec<AccountEntry>, Infallible> { Ok(Vec::new()) }

    async fn save_token(&self, account_id: &str, token: &TokenState) -> Result<(), Infallible> {
      self.saved.lock().unwrap().push((account_id.to_string(), token.clone()));
      Ok(())
    }

    async fn save_options(
      &self,
      _account_id: &str,
      _options: &MonitorOptions,
    ) -> Result<(), Infallible> {
      Ok(())
    }

    async fn remove_account(&self, _account_id: &str) -> Result<bool, Infallible> { Ok(false) }
  }

  async fn token(State(hits): State<Arc<AtomicUsize>>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "access_token": "fresh", "refresh_token": "r2", "expires_in": 3600 }))
  }

  async fn profile(headers: HeaderMap) -> Response {
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
      Some("Bearer fresh") => {
        Json(json!({ "id": "OwnerID", "presence_status": "Available" })).into_response()
      }
      _ => StatusCode::UNAUTHORIZED.into_response(),
    }
  }

  async fn zoom() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
      .route("/oauth/token", post(token))
      .route("/v2/users/me", get(profile))
      .with_state(hits.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (format!("http://{addr}"), hits)
  }

  async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..500 {
      if cond() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
  }

  fn entry() -> AccountEntry {
    let credentials = Credentials {
      client_id:          "cid".into(),
      client_secret:      "secret".into(),
      verification_token: "vt-home".into(),
    };
    // Already expired, so starting the account must refresh it.
    let stale = TokenState::from_expires_in("old".into(), Some("r1".into()), -60, Utc::now());
    let mut entry = AccountEntry::new("Home", credentials, Some(stale)).unwrap();
    entry.options.contacts_to_monitor = ["Contact1".to_string()].into();
    entry
  }

  #[tokio::test]
  async fn start_wires_polling_persistence_and_ingress() {
    let (base, token_hits) = zoom().await;
    let settings = SyncSettings {
      api_base_url: format!("{base}/v2/"),
      endpoints: OAuthEndpoints {
        authorize_url: format!("{base}/oauth/authorize"),
        token_url:     format!("{base}/oauth/token"),
      },
      ..SyncSettings::default()
    };
    let store = Arc::new(MemoryStore::default());
    let registry = WebhookRegistry::new();

    let ctx = AccountContext::start(entry(), &settings, store.clone(), &registry)
      .await
      .unwrap();
    assert_eq!(ctx.account_id(), "zoom_home");
    assert_eq!(token_hits.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.coordinator().snapshot().unwrap().id, "OwnerID");

    eventually("token persisted", || !store.saved.lock().unwrap().is_empty()).await;
    {
      let saved = store.saved.lock().unwrap();
      assert_eq!(saved[0].0, "zoom_home");
      assert_eq!(saved[0].1.access_token, "fresh");
      assert_eq!(saved[0].1.refresh_token.as_deref(), Some("r2"));
    }

    let dispatcher = ctx.dispatcher().clone();
    eventually("owner monitored", || dispatcher.is_monitored("ownerid")).await;
    assert!(dispatcher.is_monitored("contact1"));

    // A delivery through the shared ingress reaches this account's records.
    let state = WebhookState::new(registry.clone());
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("vt-home"));
    let body = br#"{"event":"user.presence_status_updated","payload":{"object":{"id":"contact1","presence_status":"Away"}}}"#;
    let resp = handle_request(&state, &headers, body).unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    eventually("presence applied", || dispatcher.record("Contact1").is_some()).await;
    assert_eq!(dispatcher.record("contact1").unwrap().status, "Away");

    ctx.teardown(&registry).await;
    assert!(!registry.is_registered("zoom_home"));
    assert!(handle_request(&state, &headers, body).is_err());
  }

  #[tokio::test]
  async fn start_survives_an_unreachable_api() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let settings = SyncSettings {
      api_base_url: format!("{dead}/v2/"),
      endpoints: OAuthEndpoints {
        authorize_url: format!("{dead}/oauth/authorize"),
        token_url:     format!("{dead}/oauth/token"),
      },
      ..SyncSettings::default()
    };
    let registry = WebhookRegistry::new();
    let ctx = AccountContext::start(entry(), &settings, Arc::new(MemoryStore::default()), &registry)
      .await
      .unwrap();

    let status = ctx.coordinator().status();
    assert!(status.snapshot.is_none());
    assert!(status.last_error.is_some());
    assert!(!status.reauth_required);
    assert!(registry.is_registered("zoom_home"));

    ctx.teardown(&registry).await;
  }
}
