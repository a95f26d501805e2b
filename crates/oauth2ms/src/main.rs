//! `oauth2ms` - OAuth2 access tokens for XOAUTH2 mail login
//!
//! Prints an access token (or the XOAUTH2 initial response) for the account
//! configured in the credential store, logging in through the browser only
//! when no cached refresh token can be redeemed.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod app;
mod cli;

use std::process::ExitCode;

use clap::Parser;
use oauth2ms_core::{CredentialStore, KeyringStore, PassStore};
use oauth2ms_oauth::{BrowserPrompt, PrintPrompt};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, StoreKind};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr, stdout carries the token
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oauth2ms=info,oauth2ms_oauth=info,oauth2ms_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    debug!(store = ?cli.store, auth_key = cli.auth_key, token_key = cli.token_key, "Starting oauth2ms");

    let result = match cli.store {
        StoreKind::Keyring => dispatch(&KeyringStore::default(), &cli).await,
        StoreKind::Pass => dispatch(&PassStore::default(), &cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if is_authorization_failure(&e) {
                eprintln!("The authorization was not granted; run oauth2ms again to retry.");
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch<S: CredentialStore>(store: &S, cli: &Cli) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if cli.no_browser {
        app::run(store, PrintPrompt, cli, &mut stdout).await
    } else {
        app::run(store, BrowserPrompt, cli, &mut stdout).await
    }
}

fn is_authorization_failure(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<oauth2ms_oauth::Error>()
            .is_some_and(oauth2ms_oauth::Error::is_authorization_failure)
    })
}
