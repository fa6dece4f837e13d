//! Inbound Zoom webhook endpoint.
//!
//! Exposes an axum [`Router`] with a single `POST` route. Each request is
//! authenticated against the registered accounts' verification tokens,
//! validated, and handed to that account's event sink. The response never
//! waits on whatever consumes the event.

pub mod auth;
pub mod error;
pub mod registry;

pub use error::Error;
pub use registry::WebhookRegistry;

use axum::{
  Router,
  extract::State,
  http::{HeaderMap, HeaderName, StatusCode},
  response::{IntoResponse, Response},
  routing::post,
};
use bytes::Bytes;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use zpresence_core::event::WebhookEvent;

use auth::presented_token;

pub const DEFAULT_WEBHOOK_PATH: &str = "/api/zoom";

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the webhook handler.
#[derive(Clone)]
pub struct WebhookState {
  pub registry: WebhookRegistry,
  /// Header the verification token is read from.
  pub header:   HeaderName,
}

impl WebhookState {
  pub fn new(registry: WebhookRegistry) -> Self {
    Self {
      registry,
      header: HeaderName::from_static(auth::DEFAULT_VERIFICATION_HEADER),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the webhook [`Router`], mounted at `path`.
pub fn router(path: &str, state: WebhookState) -> Router {
  Router::new()
    .route(path, post(webhook_handler))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn webhook_handler(
  State(state): State<WebhookState>,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  handle_request(&state, &headers, &body).into_response_or_err()
}

/// Authenticate, validate and publish one delivery.
///
/// Rejections happen in order: 401 for a bad or missing token (nothing is
/// parsed), 400 for a malformed body, otherwise 200 with an empty body once
/// the event is handed to the sink.
pub fn handle_request(
  state: &WebhookState,
  headers: &HeaderMap,
  body: &[u8],
) -> Result<Response, Error> {
  let presented = presented_token(headers, &state.header).ok_or(Error::Unauthorized)?;
  let Some((account_id, sink)) = state.registry.route(presented) else {
    tracing::warn!("webhook rejected: verification token mismatch");
    return Err(Error::Unauthorized);
  };

  let event = match parse_event(body) {
    Ok(event) => event,
    Err(e) => {
      tracing::warn!(account = %account_id, error = %e, "webhook rejected");
      return Err(e);
    }
  };

  let delivery = Uuid::new_v4();
  tracing::info!(
    %delivery,
    account = %account_id,
    event = %event.event_name,
    "webhook accepted"
  );
  sink.publish(event);
  Ok(StatusCode::OK.into_response())
}

/// Parse `{"event": <string>, "payload": <object>, ...}`. Extra top-level
/// fields are ignored.
pub fn parse_event(body: &[u8]) -> Result<WebhookEvent, Error> {
  let value: Value = serde_json::from_slice(body)
    .map_err(|e| Error::MalformedWebhook(format!("body is not JSON: {e}")))?;
  let Value::Object(mut body) = value else {
    return Err(Error::MalformedWebhook("body is not an object".into()));
  };
  let event_name = match body.remove("event") {
    Some(Value::String(name)) => name,
    Some(_) => return Err(Error::MalformedWebhook("`event` is not a string".into())),
    None => return Err(Error::MalformedWebhook("missing `event`".into())),
  };
  let payload = match body.remove("payload") {
    Some(Value::Object(payload)) => payload,
    Some(_) => return Err(Error::MalformedWebhook("`payload` is not an object".into())),
    None => return Err(Error::MalformedWebhook("missing `payload`".into())),
  };
  Ok(WebhookEvent::new(event_name, payload))
}

// ─── Helper trait ────────────────────────────────────────────────────────────

trait IntoResponseOrErr {
  fn into_response_or_err(self) -> Response;
}

impl IntoResponseOrErr for Result<Response, Error> {
  fn into_response_or_err(self) -> Response {
    match self {
      Ok(r) => r,
      Err(e) => e.into_response(),
    }
  }
}

// ─── Integration tests ────────────────────────────────────────────────────────
