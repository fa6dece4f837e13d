//! Error types for `zpresence-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("account name {0:?} does not produce a usable identifier")]
  InvalidAccountName(String),

  #[error("account already configured: {0}")]
  AccountExists(String),

  #[error("account not found: {0}")]
  AccountNotFound(String),

  #[error("unknown contact type: {0:?}")]
  UnknownContactType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
