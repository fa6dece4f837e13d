//! The `ConfigStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `zpresence-store-sqlite`). Higher layers depend on this abstraction, not on
//! any concrete backend.

use std::future::Future;

use crate::{
  account::{AccountEntry, TokenState},
  contact::MonitorOptions,
};

/// Persistence for configured accounts.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait ConfigStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new account. Fails if an account with the same
  /// `account_id` already exists.
  fn add_account<'a>(
    &'a self,
    entry: &'a AccountEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Retrieve an account by id. Returns `None` if not found.
  fn get_account<'a>(
    &'a self,
    account_id: &'a str,
  ) -> impl Future<Output = Result<Option<AccountEntry>, Self::Error>> + Send + 'a;

  /// List all accounts ordered by creation time.
  fn list_accounts(
    &self,
  ) -> impl Future<Output = Result<Vec<AccountEntry>, Self::Error>> + Send + '_;

  /// Replace the stored token pair for an account.
  fn save_token<'a>(
    &'a self,
    account_id: &'a str,
    token: &'a TokenState,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the stored monitoring options for an account.
  fn save_options<'a>(
    &'a self,
    account_id: &'a str,
    options: &'a MonitorOptions,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Delete an account. Returns `false` if it did not exist.
  fn remove_account<'a>(
    &'a self,
    account_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
