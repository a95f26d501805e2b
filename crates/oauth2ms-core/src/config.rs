//! Authorization configuration.
//!
//! The configuration is a list of `key: value` lines, the layout of a
//! password-store entry:
//!
//! ```text
//! my-client-secret
//! authority: https://login.microsoftonline.com/common
//! client_id: 00000000-0000-0000-0000-000000000000
//! redirect_uri: http://localhost:5000/getToken
//! scopes: https://outlook.office.com/IMAP.AccessAsUser.All
//! scopes: https://outlook.office.com/SMTP.Send
//! ```
//!
//! A line without a colon is shorthand for the default field,
//! `client_secret`. Repeated keys accumulate in order. Blank lines and lines
//! starting with `#` or `otpauth://` are notes and skipped.

use std::collections::BTreeMap;

use oauth2ms_oauth::{OAuthClient, Provider};
use tracing::debug;
use url::Url;

/// Field a line without a colon is assigned to.
pub const DEFAULT_FIELD: &str = "client_secret";

/// Keys that must be present with a non-empty value.
pub const REQUIRED_KEYS: [&str; 4] = ["authority", "client_id", "redirect_uri", "scopes"];

/// Keys understood by [`Config`].
const KNOWN_KEYS: [&str; 5] = [
    "authority",
    "client_id",
    "client_secret",
    "redirect_uri",
    "scopes",
];

/// Line prefixes marking free-text notes.
const NOTE_PREFIXES: [&str; 2] = ["#", "otpauth://"];

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required keys are absent or empty.
    #[error("missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<&'static str>),

    /// A URL value does not parse.
    #[error("invalid URL for '{key}': {source}")]
    InvalidUrl {
        /// Offending key.
        key: &'static str,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The redirect URI cannot be served by the local listener.
    #[error("unsupported redirect URI '{0}': expected http(s)://host[:port]/path")]
    UnsupportedRedirect(String),
}

/// Configuration text split into keys, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    values: BTreeMap<String, Vec<String>>,
}

impl RawConfig {
    /// Splits configuration text into keyed values.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut raw = Self::default();
        let mut default_seen = false;

        for line in text.lines().map(str::trim) {
            if line.is_empty() || NOTE_PREFIXES.iter().any(|p| line.starts_with(p)) {
                continue;
            }

            match line.split_once(':') {
                Some((key, value)) => raw.push(key.trim(), value.trim()),
                None if !default_seen => {
                    default_seen = true;
                    raw.push(DEFAULT_FIELD, line);
                }
                None => debug!("Ignoring extra line without a key"),
            }
        }

        for key in raw.values.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                debug!(key, "Ignoring unknown configuration key");
            }
        }
        raw
    }

    fn push(&mut self, key: &str, value: &str) {
        self.values
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// First non-empty value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).next()
    }

    /// All non-empty values of `key`, in order.
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.values
            .get(key)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Checks that every required key has a value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingKeys`] listing all absent keys.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = REQUIRED_KEYS
            .into_iter()
            .filter(|key| self.get(key).is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingKeys(missing))
        }
    }
}

/// Validated authorization configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Identity provider authority (tenant URL).
    pub authority: Url,
    /// Application (client) id.
    pub client_id: String,
    /// Client secret; present for confidential clients only.
    pub client_secret: Option<String>,
    /// Redirect URI served by the local listener.
    pub redirect_uri: Url,
    /// Scopes to request, in configuration order.
    pub scopes: Vec<String>,
}

impl Config {
    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or a URL is invalid.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::from_raw(&RawConfig::parse(text))
    }

    /// Builds the configuration from parsed text.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or a URL is invalid.
    pub fn from_raw(raw: &RawConfig) -> Result<Self, ConfigError> {
        raw.validate()?;

        let url = |key: &'static str| -> Result<Url, ConfigError> {
            let value = raw.get(key).unwrap_or_default();
            Url::parse(value).map_err(|source| ConfigError::InvalidUrl { key, source })
        };

        let redirect_uri = url("redirect_uri")?;
        if !matches!(redirect_uri.scheme(), "http" | "https") || redirect_uri.host_str().is_none() {
            return Err(ConfigError::UnsupportedRedirect(redirect_uri.to_string()));
        }

        Ok(Self {
            authority: url("authority")?,
            client_id: raw.get("client_id").unwrap_or_default().to_string(),
            client_secret: raw.get("client_secret").map(str::to_string),
            redirect_uri,
            scopes: raw
                .get_all("scopes")
                .flat_map(str::split_whitespace)
                .map(str::to_string)
                .collect(),
        })
    }

    /// Returns true if a client secret is configured.
    #[must_use]
    pub const fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }

    /// Builds the HTTPS client for this registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the authority is not a usable provider URL.
    pub fn client(&self) -> oauth2ms_oauth::Result<OAuthClient> {
        let provider = Provider::from_authority(self.authority.as_str())?;
        let client = OAuthClient::new(&self.client_id, provider);
        Ok(match &self.client_secret {
            Some(secret) => client.with_client_secret(secret),
            None => client,
        })
    }
}
