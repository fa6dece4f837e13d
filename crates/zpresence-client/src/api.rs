//! Async HTTP client wrapping the Zoom v2 REST API.

use std::{
  collections::{BTreeSet, HashSet},
  sync::Arc,
  time::Duration,
};

use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use zpresence_core::{
  contact::{Contact, ContactType},
  profile::{ProfileSnapshot, ProfileSource},
};

use crate::{Error, Result, TokenManager};

pub const DEFAULT_BASE_URL: &str = "https://api.zoom.us/v2/";

const PROFILE_PATH: &str = "users/me";
const CONTACTS_PATH: &str = "chat/users/me/contacts";
const CONTACTS_PAGE_SIZE: &str = "50";

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ContactPage {
  #[serde(default)]
  contacts:        Vec<RawContact>,
  #[serde(default)]
  next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContact {
  id:           String,
  #[serde(default)]
  email:        Option<String>,
  #[serde(default)]
  first_name:   Option<String>,
  #[serde(default)]
  last_name:    Option<String>,
  #[serde(default)]
  contact_type: Option<String>,
}

impl RawContact {
  /// `first last`, falling back to the email address and then the id.
  fn display_name(&self) -> String {
    let full = [self.first_name.as_deref(), self.last_name.as_deref()]
      .into_iter()
      .flatten()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .collect::<Vec<_>>()
      .join(" ");
    if !full.is_empty() {
      return full;
    }
    self
      .email
      .as_deref()
      .filter(|e| !e.trim().is_empty())
      .unwrap_or(&self.id)
      .to_string()
  }

  fn into_contact(self, queried: ContactType) -> Contact {
    let contact_type = self
      .contact_type
      .as_deref()
      .and_then(|t| ContactType::parse(t).ok())
      .unwrap_or(queried);
    Contact {
      display_name: self.display_name(),
      id: self.id,
      contact_type,
    }
  }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Typed access to the endpoints zpresence needs.
///
/// Cheap to clone; the inner [`reqwest::Client`] and token manager are
/// `Arc`-based.
#[derive(Clone)]
pub struct ZoomApi {
  client:   Client,
  base_url: String,
  tokens:   Arc<TokenManager>,
}

impl ZoomApi {
  pub fn new(base_url: impl Into<String>, tokens: Arc<TokenManager>) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;
    Ok(Self { client, base_url: base_url.into(), tokens })
  }

  pub fn tokens(&self) -> &Arc<TokenManager> { &self.tokens }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base_url.trim_end_matches('/'), path)
  }

  // ── Profile ───────────────────────────────────────────────────────────────

  /// `GET users/me`
  pub async fn fetch_profile(&self) -> Result<ProfileSnapshot> {
    let raw: Map<String, Value> = self.get(PROFILE_PATH, &[]).await?;
    ProfileSnapshot::from_raw(raw, Utc::now())
      .ok_or_else(|| Error::Decode("profile has no string `id`".into()))
  }

  // ── Contacts ──────────────────────────────────────────────────────────────

  /// `GET chat/users/me/contacts?type=<type>` for each requested type,
  /// following `next_page_token` until exhausted. Server order is preserved
  /// within each type; types are fetched in their declared order.
  pub async fn fetch_contacts(&self, types: &BTreeSet<ContactType>) -> Result<Vec<Contact>> {
    let mut contacts = Vec::new();

    for &contact_type in types {
      let mut cursor: Option<String> = None;
      let mut seen = HashSet::new();
      loop {
        let mut query = vec![
          ("type", contact_type.to_string()),
          ("page_size", CONTACTS_PAGE_SIZE.to_string()),
        ];
        if let Some(token) = &cursor {
          query.push(("next_page_token", token.clone()));
        }

        let page: ContactPage = self.get(CONTACTS_PATH, &query).await?;
        contacts.extend(page.contacts.into_iter().map(|c| c.into_contact(contact_type)));

        match page.next_page_token.filter(|t| !t.is_empty()) {
          Some(next) if seen.insert(next.clone()) => cursor = Some(next),
          Some(next) => {
            tracing::warn!(%contact_type, cursor = %next, "contact pages loop; stopping");
            break;
          }
          None => break,
        }
      }
      tracing::debug!(%contact_type, total = contacts.len(), "fetched contacts");
    }

    Ok(contacts)
  }

  // ── Transport ─────────────────────────────────────────────────────────────

  /// Authenticated GET. A 401 forces one token refresh and one retry; a
  /// second 401 means the credentials are no longer accepted.
  async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
    let token = self.tokens.get_valid_token().await?;
    let mut resp = self.send(path, query, &token).await?;

    if resp.status() == StatusCode::UNAUTHORIZED {
      tracing::debug!(path, "access token rejected; forcing refresh");
      let token = self.tokens.force_refresh(&token).await?;
      resp = self.send(path, query, &token).await?;
      if resp.status() == StatusCode::UNAUTHORIZED {
        return Err(Error::InvalidCredentials(format!(
          "GET {path} → 401 after token refresh"
        )));
      }
    }

    let status = resp.status();
    if !status.is_success() {
      let message = resp.text().await.unwrap_or_default();
      return Err(Error::Api { status: status.as_u16(), message });
    }
    resp
      .json()
      .await
      .map_err(|e| Error::Decode(format!("GET {path}: {e}")))
  }

  async fn send(&self, path: &str, query: &[(&str, String)], token: &str) -> Result<Response> {
    Ok(
      self
        .client
        .get(self.url(path))
        .bearer_auth(token)
        .query(query)
        .send()
        .await?,
    )
  }
}

impl ProfileSource for ZoomApi {
  type Error = Error;

  async fn fetch_profile(&self) -> Result<ProfileSnapshot> { ZoomApi::fetch_profile(self).await }

  fn requires_reauth(error: &Error) -> bool { error.requires_reauth() }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode as AxumStatus, header},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
  };
  use serde_json::json;
  use std::collections::HashMap;
  use zpresence_core::account::{Credentials, TokenState};

  use super::*;
  use crate::{OAuthEndpoints, mock};

  #[derive(Default)]
  struct Hits {
    token:    AtomicUsize,
    profile:  AtomicUsize,
    contacts: AtomicUsize,
  }

  /// How the mock profile endpoint treats bearer tokens.
  #[derive(Clone, Copy)]
  enum ProfileAuth {
    /// Accept only tokens minted by the mock token endpoint.
    RefreshedOnly,
    /// Reject everything.
    Never,
  }

  #[derive(Clone)]
  struct MockState {
    hits: Arc<Hits>,
    auth: ProfileAuth,
  }

  async fn token(State(s): State<MockState>) -> Json<Value> {
    let n = s.hits.token.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "access_token": format!("minted-{n}"), "expires_in": 3600 }))
  }

  async fn profile(State(s): State<MockState>, headers: HeaderMap) -> AxumResponse {
    s.hits.profile.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default();
    let ok = match s.auth {
      ProfileAuth::RefreshedOnly => bearer.starts_with("Bearer minted-"),
      ProfileAuth::Never => false,
    };
    if ok {
      Json(json!({ "id": "U1", "presence_status": "Available", "email": "me@x.io" }))
        .into_response()
    } else {
      (AxumStatus::UNAUTHORIZED, Json(json!({ "code": 124, "message": "Invalid access token." })))
        .into_response()
    }
  }

  async fn contacts(
    State(s): State<MockState>,
    Query(q): Query<HashMap<String, String>>,
  ) -> Json<Value> {
    s.hits.contacts.fetch_add(1, Ordering::SeqCst);
    let page = q.get("next_page_token").map(String::as_str).unwrap_or("");
    match (q.get("type").map(String::as_str), page) {
      (Some("company"), "") => Json(json!({
        "contacts": [
          { "id": "c1", "first_name": "Ada", "last_name": "Lovelace" },
          { "id": "c2", "email": "grace@x.io" },
        ],
        "next_page_token": "p2",
      })),
      (Some("company"), "p2") => Json(json!({
        "contacts": [{ "id": "c3", "first_name": "Alan", "contact_type": "company" }],
        "next_page_token": "",
      })),
      (Some("external"), _) => Json(json!({
        "contacts": [{ "id": "e1", "first_name": " ", "last_name": "" }],
      })),
      _ => Json(json!({ "contacts": [] })),
    }
  }

  async fn failing() -> (AxumStatus, &'static str) {
    (AxumStatus::INTERNAL_SERVER_ERROR, "boom")
  }

  async fn setup(auth: ProfileAuth) -> (ZoomApi, Arc<Hits>) {
    let hits = Arc::new(Hits::default());
    let router = Router::new()
      .route("/oauth/token", post(token))
      .route("/v2/users/me", get(profile))
      .route("/v2/chat/users/me/contacts", get(contacts))
      .route("/v2/failing", get(failing))
      .with_state(MockState { hits: hits.clone(), auth });
    (client_for(&mock::serve(router).await), hits)
  }

  fn client_for(base: &str) -> ZoomApi {
    let tokens = Arc::new(
      TokenManager::new(OAuthEndpoints {
        authorize_url: format!("{base}/oauth/authorize"),
        token_url:     format!("{base}/oauth/token"),
      })
      .unwrap(),
    );
    tokens
      .register(Credentials {
        client_id:          "cid".into(),
        client_secret:      "secret".into(),
        verification_token: "vt".into(),
      })
      .unwrap();
    // Valid by the clock but unknown to the server.
    tokens.seed(Some(TokenState::from_expires_in(
      "revoked".into(),
      Some("r1".into()),
      3600,
      Utc::now(),
    )));

    ZoomApi::new(format!("{base}/v2/"), tokens).unwrap()
  }

  #[tokio::test]
  async fn single_401_refreshes_once_and_retries() {
    let (api, hits) = setup(ProfileAuth::RefreshedOnly).await;
    let snap = api.fetch_profile().await.unwrap();
    assert_eq!(snap.id, "U1");
    assert_eq!(snap.presence_status.as_deref(), Some("Available"));
    assert_eq!(hits.token.load(Ordering::SeqCst), 1);
    assert_eq!(hits.profile.load(Ordering::SeqCst), 2);

    // The refreshed token is reused afterwards.
    api.fetch_profile().await.unwrap();
    assert_eq!(hits.token.load(Ordering::SeqCst), 1);
    assert_eq!(hits.profile.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn second_401_is_invalid_credentials_without_third_request() {
    let (api, hits) = setup(ProfileAuth::Never).await;
    let err = api.fetch_profile().await.unwrap_err();
    assert!(matches!(err, Error::InvalidCredentials(_)), "{err}");
    assert_eq!(hits.token.load(Ordering::SeqCst), 1);
    assert_eq!(hits.profile.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn contacts_follow_pagination_in_order() {
    let (api, hits) = setup(ProfileAuth::RefreshedOnly).await;
    let types: BTreeSet<_> = ContactType::ALL.into_iter().collect();
    let contacts = api.fetch_contacts(&types).await.unwrap();

    let summary: Vec<_> = contacts
      .iter()
      .map(|c| (c.id.as_str(), c.display_name.as_str(), c.contact_type))
      .collect();
    assert_eq!(
      summary,
      vec![
        ("c1", "Ada Lovelace", ContactType::Company),
        ("c2", "grace@x.io", ContactType::Company),
        ("c3", "Alan", ContactType::Company),
        ("e1", "e1", ContactType::External),
      ]
    );
    assert_eq!(hits.contacts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn cyclic_page_tokens_stop_after_each_page_once() {
    async fn cycling(
      State(hits): State<Arc<AtomicUsize>>,
      Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
      hits.fetch_add(1, Ordering::SeqCst);
      let (id, next) = match q.get("next_page_token").map(String::as_str) {
        None => ("c0", "A"),
        Some("A") => ("cA", "B"),
        _ => ("cB", "A"),
      };
      Json(json!({ "contacts": [{ "id": id }], "next_page_token": next }))
    }
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
      .route("/v2/chat/users/me/contacts", get(cycling))
      .with_state(hits.clone());
    let api = client_for(&mock::serve(router).await);

    let contacts = api.fetch_contacts(&BTreeSet::from([ContactType::Company])).await.unwrap();
    let ids: Vec<_> = contacts.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["c0", "cA", "cB"]);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn non_success_maps_to_api_error() {
    let (api, _hits) = setup(ProfileAuth::RefreshedOnly).await;
    let err = api.get::<Value>("failing", &[]).await.unwrap_err();
    assert!(
      matches!(&err, Error::Api { status: 500, message } if message == "boom"),
      "{err}"
    );
  }
}
