//! Configuration and interactive helpers for the `zpresence` binary.

pub mod prompt;

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use axum::http::{HeaderName, header::InvalidHeaderName};
use serde::Deserialize;
use zpresence_client::{
  OAuthEndpoints,
  api::DEFAULT_BASE_URL,
  token::{ZOOM_AUTHORIZE_URL, ZOOM_TOKEN_URL},
};
use zpresence_core::presence::DEFAULT_OFF_STATUS;
use zpresence_sync::{SyncSettings, bus};
use zpresence_webhook::{
  DEFAULT_WEBHOOK_PATH, WebhookRegistry, WebhookState, auth::DEFAULT_VERIFICATION_HEADER,
};

/// Prefix for environment variables overriding the config file.
pub const ENV_PREFIX: &str = "ZPRESENCE";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Top-level server configuration, loaded from a TOML file and/or
/// `ZPRESENCE_*` environment variables. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                 String,
  pub port:                 u16,
  pub store_path:           PathBuf,
  pub webhook_path:         String,
  /// Header the Zoom verification token arrives in.
  pub verification_header:  String,
  pub poll_interval_secs:   u64,
  pub api_base_url:         String,
  pub authorize_url:        String,
  pub token_url:            String,
  /// Must match the redirect URL registered with the Zoom app.
  pub redirect_uri:         String,
  /// Presence status that reads as unoccupied.
  pub occupancy_off_status: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                 "127.0.0.1".to_string(),
      port:                 8123,
      store_path:           PathBuf::from("~/.local/share/zpresence/zpresence.db"),
      webhook_path:         DEFAULT_WEBHOOK_PATH.to_string(),
      verification_header:  DEFAULT_VERIFICATION_HEADER.to_string(),
      poll_interval_secs:   60,
      api_base_url:         DEFAULT_BASE_URL.to_string(),
      authorize_url:        ZOOM_AUTHORIZE_URL.to_string(),
      token_url:            ZOOM_TOKEN_URL.to_string(),
      redirect_uri:         "http://localhost:8123/auth/external/callback".to_string(),
      occupancy_off_status: DEFAULT_OFF_STATUS.to_string(),
    }
  }
}

impl ServerConfig {
  /// Layer `ZPRESENCE_*` environment variables over the file at `path`. A
  /// missing file is not an error.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(config::Environment::with_prefix(ENV_PREFIX))
      .build()?
      .try_deserialize()
  }

  /// `store_path` with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn oauth_endpoints(&self) -> OAuthEndpoints {
    OAuthEndpoints {
      authorize_url: self.authorize_url.clone(),
      token_url:     self.token_url.clone(),
    }
  }

  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      api_base_url:  self.api_base_url.clone(),
      endpoints:     self.oauth_endpoints(),
      // A zero period would make the interval timer panic.
      poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
      bus_capacity:  bus::DEFAULT_CAPACITY,
    }
  }

  pub fn webhook_state(
    &self,
    registry: WebhookRegistry,
  ) -> Result<WebhookState, InvalidHeaderName> {
    Ok(WebhookState {
      registry,
      header: HeaderName::try_from(self.verification_header.to_ascii_lowercase())?,
    })
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
