//! One token request, from configuration to printed token.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use oauth2ms_core::{Config, CredentialStore, load_cache, load_config, save_cache};
use oauth2ms_oauth::sasl::xoauth2_response_ascii;
use oauth2ms_oauth::{AccessToken, AuthorizationPrompt, TokenCache, TokenEngine};
use tracing::{debug, info, warn};

use crate::cli::Cli;

/// Acquires a token with the credentials in `store` and writes it to `out`.
///
/// The token cache is saved even when the token cannot be written; a failure
/// to save it is logged and does not fail the run.
pub async fn run<S, A, W>(store: &S, prompt: A, cli: &Cli, out: &mut W) -> Result<()>
where
    S: CredentialStore,
    A: AuthorizationPrompt,
    W: Write,
{
    let config = match &cli.config {
        Some(path) => read_config(path).await?,
        None => load_config(store, &cli.auth_key)
            .await
            .with_context(|| format!("Failed to load configuration '{}'", cli.auth_key))?,
    };
    let mut cache = load_cache(store, &cli.token_key)
        .await
        .with_context(|| format!("Failed to load token cache '{}'", cli.token_key))?;

    let client = config.client().context("Invalid authority")?;
    let engine = TokenEngine::new(client, prompt, config.redirect_uri, config.scopes)
        .with_timeout(cli.timeout());
    let token = engine.acquire(&mut cache).await?;
    info!(source = ?token.source(), "Acquired access token");

    deliver(store, cli, &token, &cache, out).await
}

/// Writes the token, then saves the cache whatever the write outcome.
async fn deliver<S, W>(
    store: &S,
    cli: &Cli,
    token: &AccessToken,
    cache: &TokenCache,
    out: &mut W,
) -> Result<()>
where
    S: CredentialStore,
    W: Write,
{
    let written = render(token, cli).and_then(|line| {
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    });
    persist(store, &cli.token_key, cache).await;
    written
}

async fn read_config(path: &Path) -> Result<Config> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    debug!(path = %path.display(), "Read configuration file");
    Config::parse(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
}

/// Formats the token for stdout.
fn render(token: &AccessToken, cli: &Cli) -> Result<String> {
    if !cli.encode_xoauth2 {
        return Ok(token.secret().to_string());
    }

    let Some(user) = token.username().or(cli.username.as_deref()) else {
        bail!("No username known for XOAUTH2; pass --username");
    };
    Ok(xoauth2_response_ascii(user, token.secret())?)
}

async fn persist<S: CredentialStore>(store: &S, key: &str, cache: &TokenCache) {
    if let Err(e) = save_cache(store, key, cache).await {
        warn!("Failed to save token cache '{key}': {e}");
    }
}
