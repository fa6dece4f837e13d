//! `zpresence` binary.
//!
//! Reads `zpresence.toml` (or the path given with `--config`), opens the
//! SQLite account store and either serves the Zoom webhook endpoint or runs
//! one of the account management commands.
//!
//! ```
//! zpresence add-account --name Home --client-id .. --client-secret .. --verification-token ..
//! zpresence configure --account zoom_home
//! zpresence serve
//! ```

use std::{
  io::{self, BufRead, Write},
  path::PathBuf,
  sync::Arc,
};

use anyhow::{Context as _, anyhow, bail};
use clap::{Parser, Subcommand};
use rand_core::{OsRng, RngCore};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use zpresence_client::{TokenManager, ZoomApi};
use zpresence_core::{
  account::{AccountEntry, Credentials},
  store::ConfigStore,
  wizard::{OptionsWizard, WizardError, WizardInput, WizardStep},
};
use zpresence_server::{
  ServerConfig,
  prompt::{Prompt, authorization_code},
};
use zpresence_store_sqlite::SqliteStore;
use zpresence_sync::AccountContext;
use zpresence_webhook::WebhookRegistry;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "zpresence", version, about = "Zoom presence sync")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "zpresence.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run every stored account and serve the webhook endpoint.
  Serve,

  /// Authorize a Zoom app and store it as a new account.
  AddAccount {
    /// Display name; the account id is derived from it.
    #[arg(long)]
    name:               String,
    #[arg(long, env = "ZPRESENCE_CLIENT_ID")]
    client_id:          String,
    #[arg(long, env = "ZPRESENCE_CLIENT_SECRET")]
    client_secret:      String,
    #[arg(long, env = "ZPRESENCE_VERIFICATION_TOKEN")]
    verification_token: String,
  },

  /// Choose which contacts an account monitors.
  Configure {
    #[arg(long)]
    account: String,
  },

  /// Delete a stored account.
  RemoveAccount {
    #[arg(long)]
    account: String,
  },

  /// List stored accounts.
  ListAccounts,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ServerConfig::load(&cli.config).context("failed to read configuration")?;

  let store_path = cfg.resolved_store_path();
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Serve => serve(cfg, Arc::new(store)).await,
    Command::AddAccount {
      name,
      client_id,
      client_secret,
      verification_token,
    } => {
      let credentials = Credentials { client_id, client_secret, verification_token };
      add_account(&cfg, &store, &name, credentials).await
    }
    Command::Configure { account } => configure(&cfg, &store, &account).await,
    Command::RemoveAccount { account } => {
      if !store.remove_account(&account).await? {
        bail!("no account named {account}");
      }
      println!("Removed {account}.");
      Ok(())
    }
    Command::ListAccounts => {
      for entry in store.list_accounts().await? {
        let authorized = if entry.token.is_some() { "authorized" } else { "not authorized" };
        println!(
          "{}\t{}\t{authorized}\t{} contact(s)",
          entry.account_id,
          entry.name,
          entry.options.contacts_to_monitor.len()
        );
      }
      Ok(())
    }
  }
}

// ─── serve ────────────────────────────────────────────────────────────────────

async fn serve(cfg: ServerConfig, store: Arc<SqliteStore>) -> anyhow::Result<()> {
  let registry = WebhookRegistry::new();
  let settings = cfg.sync_settings();

  let mut contexts = Vec::new();
  for entry in store.list_accounts().await.context("failed to list accounts")? {
    let account_id = entry.account_id.clone();
    let ctx = AccountContext::start(entry, &settings, store.clone(), &registry)
      .await
      .with_context(|| format!("failed to start {account_id}"))?;

    let off_status = cfg.occupancy_off_status.clone();
    ctx.dispatcher().add_observer(move |record| {
      tracing::info!(
        account = %account_id,
        subject = %record.subject_id,
        status = %record.status,
        occupancy = %record.occupancy(&off_status),
        "presence changed"
      );
    });
    contexts.push(ctx);
  }
  if contexts.is_empty() {
    tracing::warn!("no accounts configured; run `zpresence add-account` first");
  }

  let state = cfg
    .webhook_state(registry.clone())
    .context("invalid verification_header")?;
  let app = zpresence_webhook::router(&cfg.webhook_path, state);
  let address = cfg.address();

  tracing::info!("Listening on http://{address}{}", cfg.webhook_path);
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  for ctx in contexts {
    ctx.teardown(&registry).await;
  }
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    return;
  }
  tracing::info!("shutting down");
}

// ─── add-account ──────────────────────────────────────────────────────────────

async fn add_account(
  cfg: &ServerConfig,
  store: &SqliteStore,
  name: &str,
  credentials: Credentials,
) -> anyhow::Result<()> {
  let mut entry = AccountEntry::new(name, credentials.clone(), None)?;
  if store.get_account(&entry.account_id).await?.is_some() {
    bail!("account {} already exists", entry.account_id);
  }

  let tokens = TokenManager::new(cfg.oauth_endpoints())?;
  tokens.register(credentials)?;

  let mut state = [0u8; 16];
  OsRng.fill_bytes(&mut state);
  let state = hex::encode(state);
  let url = tokens.authorize_url(&cfg.redirect_uri, &state)?;

  let mut prompt = stdio_prompt();
  prompt.say(&format!("Open this URL and authorize the app:\n\n  {url}\n"))?;
  let answer = prompt.ask("Paste the redirect URL (or just its `code`):")?;
  let code = authorization_code(&answer, &state)?;

  entry.token = Some(
    tokens
      .exchange_code(&code, &cfg.redirect_uri)
      .await
      .context("authorization code exchange failed")?,
  );
  store.add_account(&entry).await?;

  println!(
    "Added {}. Run `zpresence configure --account {}` to choose contacts.",
    entry.account_id, entry.account_id
  );
  Ok(())
}

// ─── configure ────────────────────────────────────────────────────────────────

async fn configure(cfg: &ServerConfig, store: &SqliteStore, account: &str) -> anyhow::Result<()> {
  let entry = store
    .get_account(account)
    .await?
    .ok_or_else(|| anyhow!("no account named {account}"))?;

  let tokens = Arc::new(TokenManager::new(cfg.oauth_endpoints())?);
  tokens.register(entry.credentials.clone())?;
  tokens.seed(entry.token.clone());
  let api = ZoomApi::new(cfg.api_base_url.clone(), tokens.clone())?;

  let mut prompt = stdio_prompt();
  let mut wizard = OptionsWizard::new(entry.options.clone());
  let outcome = loop {
    let input = match wizard.step().clone() {
      WizardStep::ChooseContactTypes { default } => {
        WizardInput::ContactTypes(prompt.contact_types(&default)?)
      }
      WizardStep::LoadingContacts { contact_types } => {
        prompt.say("Loading contacts...")?;
        WizardInput::ContactsLoaded(api.fetch_contacts(&contact_types).await?)
      }
      WizardStep::ChooseContacts { labels, default_mode, default_selection } => {
        let (mode, selection) = prompt.selection(&labels, default_mode, &default_selection)?;
        WizardInput::Selection { mode, selection }
      }
      WizardStep::NoContacts => {
        prompt.ask("No contacts were found for those types. Press enter to continue.")?;
        WizardInput::Acknowledge
      }
      WizardStep::Finished(outcome) => break outcome,
    };

    match wizard.advance(input) {
      Ok(_) => {}
      Err(WizardError::UnknownLabels(unknown)) => {
        prompt.say(&format!("  not in the list: {}", unknown.join(", ")))?;
      }
      Err(e) => return Err(e.into()),
    }
  };

  // Contact loading may have refreshed the token.
  if let Some(token) = tokens.current()
    && entry.token.as_ref() != Some(&token)
  {
    store.save_token(account, &token).await?;
  }

  match outcome {
    Some(options) => {
      store.save_options(account, &options).await?;
      println!(
        "Monitoring {} contact(s) for {account}. Restart `zpresence serve` to apply.",
        options.contacts_to_monitor.len()
      );
    }
    None => println!("Settings for {account} unchanged."),
  }
  Ok(())
}

fn stdio_prompt() -> Prompt<impl BufRead, impl Write> {
  Prompt::new(io::stdin().lock(), io::stdout())
}
