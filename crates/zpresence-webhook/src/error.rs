//! Error types and axum `IntoResponse` implementation.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing verification header, or no registered account matches it.
  #[error("unauthorized")]
  Unauthorized,
  /// The body is not `{"event": <string>, "payload": <object>}`.
  #[error("malformed webhook: {0}")]
  MalformedWebhook(String),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
      Error::MalformedWebhook(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
    }
  }
}
