//! Authenticated access to the Zoom REST API.
//!
//! [`TokenManager`] owns the OAuth client credentials and the current token
//! pair, refreshing it before it expires. [`ZoomApi`] issues typed requests
//! through it and retries once with a forced refresh when Zoom answers 401.

pub mod api;
pub mod error;
pub mod token;

pub use api::ZoomApi;
pub use error::{Error, Result};
pub use token::{OAuthEndpoints, TokenManager};
