//! Error type for `zpresence-client`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The token endpoint could not be reached. Retry later.
  #[error("token exchange failed: {0}")]
  TransientAuth(String),

  /// Zoom rejected the credentials or refresh token. Fatal until the account
  /// is re-authorized.
  #[error("credentials rejected: {0}")]
  InvalidCredentials(String),

  #[error("api returned {status}: {message}")]
  Api { status: u16, message: String },

  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("unexpected response: {0}")]
  Decode(String),

  #[error("credentials already registered with different values")]
  CredentialsConflict,

  #[error("no credentials registered")]
  NotRegistered,

  #[error("invalid url {0:?}")]
  InvalidUrl(String),
}

impl Error {
  /// Whether the stored credentials must be re-authorized by a human.
  pub fn requires_reauth(&self) -> bool { matches!(self, Error::InvalidCredentials(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
