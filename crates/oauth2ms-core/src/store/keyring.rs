//! Secure storage using the system keyring.
//!
//! Platform backends:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::debug;

use super::{CredentialStore, SERVICE_NAME, StoreResult};

/// Keyring entries under one service name.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringStore {
    /// Creates a store for entries of `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> StoreResult<Entry> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl CredentialStore for KeyringStore {
    async fn load(&self, key: &str) -> StoreResult<Option<String>> {
        // Backends block on D-Bus or the platform API.
        let entry = self.entry(key)?;
        let found = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(std::io::Error::from)?;

        match found {
            Ok(value) => {
                debug!(service = self.service, key, "Read keyring entry");
                Ok(Some(value))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(service = self.service, key, "No keyring entry");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &str, value: &str) -> StoreResult<()> {
        let entry = self.entry(key)?;
        let value = value.to_string();
        tokio::task::spawn_blocking(move || entry.set_password(&value))
            .await
            .map_err(std::io::Error::from)??;
        debug!(service = self.service, key, "Stored keyring entry");
        Ok(())
    }
}
