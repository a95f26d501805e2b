//! Command line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Credential store holding the configuration and token cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Platform keyring (Secret Service, Keychain, Credential Manager).
    Keyring,
    /// The `pass` password manager.
    Pass,
}

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    version,
    about = "Fetch an OAuth2 access token from the Microsoft identity platform",
    long_about = "oauth2ms prints an access token for IMAP/SMTP XOAUTH2 login.\n\n\
                  The configuration (authority, client_id, redirect_uri, scopes and an \
                  optional client secret as `key: value` lines) is read from the \
                  credential store entry named by --auth-key. Refresh credentials are \
                  cached under --token-key so later runs avoid the browser."
)]
pub struct Cli {
    /// Store entry holding the configuration
    #[arg(long, default_value = "oauth2ms")]
    pub auth_key: String,

    /// Store entry holding the token cache
    #[arg(long, default_value = "oauth2ms")]
    pub token_key: String,

    /// Print the base64 XOAUTH2 initial response instead of the raw token
    #[arg(long, default_value_t = false)]
    pub encode_xoauth2: bool,

    /// Print the authorization URL instead of opening a browser
    #[arg(long, default_value_t = false)]
    pub no_browser: bool,

    /// Credential store backend
    #[arg(long, value_enum, env = "OAUTH2MS_STORE", default_value_t = StoreKind::Keyring)]
    pub store: StoreKind,

    /// Read the configuration from this file instead of the store
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Give up waiting for the browser redirect after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// XOAUTH2 username when the identity provider does not report one
    #[arg(long, value_name = "ADDR")]
    pub username: Option<String>,
}

impl Cli {
    /// Redirect wait limit.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
