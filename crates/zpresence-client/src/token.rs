//! OAuth2 token lifecycle for one account.
//!
//! The current [`TokenState`] lives in a `watch` channel: a refresh replaces
//! the whole pair in one step, readers never see a half-written value, and the
//! account owner can subscribe to persist every new pair. Refreshes are
//! serialised behind an async mutex and re-check the token after acquiring
//! it, so concurrent callers that all find the token stale share a single
//! exchange.

use std::{sync::OnceLock, time::Duration};

use chrono::Utc;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::{Mutex, watch};
use zpresence_core::account::{Credentials, TokenState};

use crate::{Error, Result};

pub const ZOOM_AUTHORIZE_URL: &str = "https://zoom.us/oauth/authorize";
pub const ZOOM_TOKEN_URL: &str = "https://zoom.us/oauth/token";

/// Zoom omits `expires_in` on some error-free responses; its tokens live an
/// hour.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

// ─── Endpoints ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
  pub authorize_url: String,
  pub token_url:     String,
}

impl Default for OAuthEndpoints {
  fn default() -> Self {
    Self {
      authorize_url: ZOOM_AUTHORIZE_URL.to_string(),
      token_url:     ZOOM_TOKEN_URL.to_string(),
    }
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
  access_token:  String,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in:    Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorBody {
  #[serde(default)]
  error:             Option<String>,
  #[serde(default)]
  reason:            Option<String>,
  #[serde(default)]
  error_description: Option<String>,
}

impl TokenErrorBody {
  fn message(self) -> Option<String> {
    self.reason.or(self.error_description).or(self.error)
  }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Owns one account's OAuth credentials and token pair.
pub struct TokenManager {
  client:       Client,
  endpoints:    OAuthEndpoints,
  credentials:  OnceLock<Credentials>,
  tokens:       watch::Sender<Option<TokenState>>,
  refresh_lock: Mutex<()>,
}

impl TokenManager {
  pub fn new(endpoints: OAuthEndpoints) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;
    Ok(Self::with_client(client, endpoints))
  }

  pub fn with_client(client: Client, endpoints: OAuthEndpoints) -> Self {
    let (tokens, _) = watch::channel(None);
    Self {
      client,
      endpoints,
      credentials: OnceLock::new(),
      tokens,
      refresh_lock: Mutex::new(()),
    }
  }

  /// Store the account's credentials. Registering the same values twice is
  /// a no-op; registering different ones is a configuration error.
  pub fn register(&self, credentials: Credentials) -> Result<()> {
    match self.credentials.set(credentials) {
      Ok(()) => Ok(()),
      Err(attempted) if self.credentials.get() == Some(&attempted) => Ok(()),
      Err(_) => Err(Error::CredentialsConflict),
    }
  }

  pub fn credentials(&self) -> Result<&Credentials> {
    self.credentials.get().ok_or(Error::NotRegistered)
  }

  /// Install a previously persisted token pair without notifying
  /// subscribers.
  pub fn seed(&self, token: Option<TokenState>) {
    self.tokens.send_replace(token);
  }

  /// The current token pair, valid or not.
  pub fn current(&self) -> Option<TokenState> { self.tokens.borrow().clone() }

  /// Receive every token pair installed by a refresh or code exchange.
  pub fn subscribe(&self) -> watch::Receiver<Option<TokenState>> { self.tokens.subscribe() }

  /// Return an access token that is not expired, refreshing first when
  /// needed.
  pub async fn get_valid_token(&self) -> Result<String> {
    if let Some(token) = self.valid_access_token() {
      return Ok(token);
    }

    let _guard = self.refresh_lock.lock().await;
    // Another caller may have refreshed while we waited.
    if let Some(token) = self.valid_access_token() {
      return Ok(token);
    }
    Ok(self.refresh_grant().await?.access_token)
  }

  /// Refresh even though the clock says `stale` is still valid, e.g. after
  /// the API rejected it. Skipped if another caller already replaced it.
  pub async fn force_refresh(&self, stale: &str) -> Result<String> {
    let _guard = self.refresh_lock.lock().await;
    if let Some(token) = self.valid_access_token()
      && token != stale
    {
      return Ok(token);
    }
    Ok(self.refresh_grant().await?.access_token)
  }

  /// Build the URL the user visits to grant access.
  pub fn authorize_url(&self, redirect_uri: &str, state: &str) -> Result<String> {
    let credentials = self.credentials()?;
    let url = Url::parse_with_params(
      &self.endpoints.authorize_url,
      &[
        ("response_type", "code"),
        ("client_id", credentials.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("state", state),
      ],
    )
    .map_err(|_| Error::InvalidUrl(self.endpoints.authorize_url.clone()))?;
    Ok(url.into())
  }

  /// Exchange an authorization code for the first token pair.
  pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenState> {
    let _guard = self.refresh_lock.lock().await;
    let token = self
      .request_token(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
      ])
      .await?;
    self.tokens.send_replace(Some(token.clone()));
    Ok(token)
  }

  fn valid_access_token(&self) -> Option<String> {
    let now = Utc::now();
    self
      .tokens
      .borrow()
      .as_ref()
      .filter(|t| !t.is_expired_at(now))
      .map(|t| t.access_token.clone())
  }

  /// Run the refresh-token grant. Caller must hold `refresh_lock`.
  async fn refresh_grant(&self) -> Result<TokenState> {
    let refresh_token = self
      .current()
      .and_then(|t| t.refresh_token)
      .ok_or_else(|| {
        Error::InvalidCredentials("no refresh token; re-authorize the account".into())
      })?;

    tracing::debug!("refreshing access token");
    let mut token = self
      .request_token(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token.as_str()),
      ])
      .await?;
    if token.refresh_token.is_none() {
      token.refresh_token = Some(refresh_token);
    }

    self.tokens.send_replace(Some(token.clone()));
    tracing::info!(expires_at = %token.expires_at, "access token refreshed");
    Ok(token)
  }

  async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenState> {
    let credentials = self.credentials()?;
    let resp = self
      .client
      .post(&self.endpoints.token_url)
      .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
      .form(form)
      .send()
      .await
      .map_err(|e| Error::TransientAuth(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      let reason = serde_json::from_str::<TokenErrorBody>(&body)
        .ok()
        .and_then(TokenErrorBody::message)
        .unwrap_or(body);
      if status.is_server_error() {
        tracing::warn!(%status, %reason, "token endpoint unavailable");
        return Err(Error::TransientAuth(format!("{status}: {reason}")));
      }
      tracing::warn!(%status, %reason, "token endpoint rejected grant");
      return Err(Error::InvalidCredentials(format!("{status}: {reason}")));
    }

    let body: TokenResponse = resp
      .json()
      .await
      .map_err(|e| Error::Decode(format!("token response: {e}")))?;
    Ok(TokenState::from_expires_in(
      body.access_token,
      body.refresh_token,
      body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
      Utc::now(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use std::{
    collections::HashMap,
    sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
    },
  };

  use axum::{Form, Json, Router, extract::State, http::StatusCode, routing::post};
  use chrono::TimeDelta;
  use serde_json::{Value, json};

  use super::*;
  use crate::mock;

  fn creds() -> Credentials {
    Credentials {
      client_id:          "cid".into(),
      client_secret:      "secret".into(),
      verification_token: "vt".into(),
    }
  }

  fn expired(refresh: Option<&str>) -> TokenState {
    TokenState {
      access_token:  "old-access".into(),
      refresh_token: refresh.map(str::to_string),
      expires_at:    Utc::now() - TimeDelta::seconds(5),
    }
  }

  /// Token endpoint that counts grants and echoes a numbered access token.
  async fn token_server(hits: Arc<AtomicUsize>) -> String {
    async fn grant(
      State(hits): State<Arc<AtomicUsize>>,
      Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
      let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
      // Give concurrent callers a chance to pile up behind the lock.
      tokio::time::sleep(Duration::from_millis(50)).await;
      let access = format!("{}-{n}", form.get("grant_type").cloned().unwrap_or_default());
      Json(json!({ "access_token": access, "expires_in": 3600 }))
    }
    mock::serve(Router::new().route("/oauth/token", post(grant)).with_state(hits)).await
  }

  fn manager(base: &str) -> TokenManager {
    let tm = TokenManager::new(OAuthEndpoints {
      authorize_url: format!("{base}/oauth/authorize"),
      token_url:     format!("{base}/oauth/token"),
    })
    .unwrap();
    tm.register(creds()).unwrap();
    tm
  }

  #[tokio::test]
  async fn valid_token_is_returned_without_refresh() {
    let hits = Arc::new(AtomicUsize::new(0));
    let tm = manager(&token_server(hits.clone()).await);
    tm.seed(Some(TokenState::from_expires_in("fresh".into(), Some("r".into()), 3600, Utc::now())));

    assert_eq!(tm.get_valid_token().await.unwrap(), "fresh");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn concurrent_callers_share_one_refresh() {
    let hits = Arc::new(AtomicUsize::new(0));
    let tm = Arc::new(manager(&token_server(hits.clone()).await));
    tm.seed(Some(expired(Some("r1"))));
    let mut updates = tm.subscribe();

    let calls: Vec<_> = (0..8)
      .map(|_| {
        let tm = tm.clone();
        tokio::spawn(async move { tm.get_valid_token().await })
      })
      .collect();
    for call in calls {
      assert_eq!(call.await.unwrap().unwrap(), "refresh_token-1");
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    updates.changed().await.unwrap();
    let stored = updates.borrow().clone().unwrap();
    // Zoom omitted a new refresh token, so the old one is kept.
    assert_eq!(stored.refresh_token.as_deref(), Some("r1"));
  }

  #[tokio::test]
  async fn force_refresh_skips_when_token_already_replaced() {
    let hits = Arc::new(AtomicUsize::new(0));
    let tm = manager(&token_server(hits.clone()).await);
    tm.seed(Some(TokenState::from_expires_in(
      "current".into(),
      Some("r".into()),
      3600,
      Utc::now(),
    )));

    assert_eq!(tm.force_refresh("older").await.unwrap(), "current");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    assert_eq!(tm.force_refresh("current").await.unwrap(), "refresh_token-1");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn rejected_grant_is_invalid_credentials() {
    async fn reject() -> (StatusCode, Json<Value>) {
      (
        StatusCode::BAD_REQUEST,
        Json(json!({ "reason": "Invalid Token!", "error": "invalid_request" })),
      )
    }
    let base = mock::serve(Router::new().route("/oauth/token", post(reject))).await;
    let tm = manager(&base);
    tm.seed(Some(expired(Some("r1"))));

    let err = tm.get_valid_token().await.unwrap_err();
    assert!(matches!(&err, Error::InvalidCredentials(m) if m.contains("Invalid Token!")), "{err}");
    assert!(err.requires_reauth());
  }

  #[tokio::test]
  async fn token_endpoint_outage_is_transient() {
    async fn unavailable() -> (StatusCode, &'static str) {
      (StatusCode::SERVICE_UNAVAILABLE, "maintenance")
    }
    let base = mock::serve(Router::new().route("/oauth/token", post(unavailable))).await;
    let tm = manager(&base);
    tm.seed(Some(expired(Some("r1"))));

    let err = tm.get_valid_token().await.unwrap_err();
    assert!(matches!(&err, Error::TransientAuth(m) if m.contains("maintenance")), "{err}");
    assert!(!err.requires_reauth());
    // The stored pair is untouched, so the next poll can retry.
    assert_eq!(tm.current().unwrap().refresh_token.as_deref(), Some("r1"));
  }

  #[tokio::test]
  async fn unreachable_token_endpoint_is_transient() {
    let tm = manager(&mock::dead_url().await);
    tm.seed(Some(expired(Some("r1"))));
    assert!(matches!(tm.get_valid_token().await, Err(Error::TransientAuth(_))));
  }

  #[tokio::test]
  async fn missing_refresh_token_is_invalid_credentials() {
    let tm = manager(&mock::dead_url().await);
    tm.seed(Some(expired(None)));
    assert!(matches!(tm.get_valid_token().await, Err(Error::InvalidCredentials(_))));

    let empty = manager(&mock::dead_url().await);
    assert!(matches!(empty.get_valid_token().await, Err(Error::InvalidCredentials(_))));
  }

  #[tokio::test]
  async fn exchange_code_installs_first_token() {
    let hits = Arc::new(AtomicUsize::new(0));
    let tm = manager(&token_server(hits.clone()).await);
    let token = tm.exchange_code("abc", "http://localhost/cb").await.unwrap();
    assert_eq!(token.access_token, "authorization_code-1");
    assert_eq!(tm.get_valid_token().await.unwrap(), "authorization_code-1");
  }

  #[test]
  fn register_rejects_different_credentials() {
    let tm = TokenManager::new(OAuthEndpoints::default()).unwrap();
    tm.register(creds()).unwrap();
    tm.register(creds()).unwrap();
    let other = Credentials { client_secret: "different".into(), ..creds() };
    assert!(matches!(tm.register(other), Err(Error::CredentialsConflict)));
  }

  #[test]
  fn authorize_url_carries_client_and_state() {
    let tm = TokenManager::new(OAuthEndpoints::default()).unwrap();
    assert!(matches!(tm.authorize_url("http://cb", "s"), Err(Error::NotRegistered)));
    tm.register(creds()).unwrap();
    let url = tm.authorize_url("http://localhost:8123/cb", "xyz").unwrap();
    assert!(url.starts_with(ZOOM_AUTHORIZE_URL));
    assert!(url.contains("client_id=cid"));
    assert!(url.contains("state=xyz"));
    assert!(url.contains("response_type=code"));
  }
}
