//! Loading and saving the configuration and token cache.
//!
//! Both are text entries in a [`CredentialStore`]: the configuration under
//! the auth key, the serialized [`TokenCache`] under the token key.

use oauth2ms_oauth::TokenCache;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::CredentialStore;

/// Reads and validates the configuration stored under `key`.
///
/// # Errors
///
/// Returns [`Error::ConfigNotFound`] if the entry does not exist, or an error
/// if the store fails or the configuration is invalid.
pub async fn load_config<S: CredentialStore>(store: &S, key: &str) -> Result<Config> {
    let text = store
        .load(key)
        .await?
        .ok_or_else(|| Error::ConfigNotFound(key.to_string()))?;
    let config = Config::parse(&text)?;
    debug!(key, client_id = config.client_id, "Loaded configuration");
    Ok(config)
}

/// Reads the token cache stored under `key`.
///
/// A missing entry yields an empty cache.
///
/// # Errors
///
/// Returns an error if the store fails or the entry is not a valid cache.
pub async fn load_cache<S: CredentialStore>(store: &S, key: &str) -> Result<TokenCache> {
    match store.load(key).await? {
        Some(text) => Ok(TokenCache::deserialize(&text)?),
        None => {
            debug!(key, "No token cache, starting empty");
            Ok(TokenCache::default())
        }
    }
}

/// Writes `cache` under `key` if it changed since it was loaded.
///
/// Returns whether anything was written.
///
/// # Errors
///
/// Returns an error if serialization or the store write fails.
pub async fn save_cache<S: CredentialStore>(
    store: &S,
    key: &str,
    cache: &TokenCache,
) -> Result<bool> {
    if !cache.has_state_changed() {
        debug!(key, "Token cache unchanged");
        return Ok(false);
    }

    let text = cache.serialize()?;
    store.store(key, &text).await?;
    info!(key, "Saved token cache");
    Ok(true)
}
