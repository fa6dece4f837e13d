//! Error types for zpresence-sync.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("client error: {0}")]
  Client(#[from] zpresence_client::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
