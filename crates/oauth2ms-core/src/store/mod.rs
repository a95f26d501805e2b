//! Credential store backends.
//!
//! The configuration and the token cache are kept as text entries in a
//! credential store. Backends:
//! - [`KeyringStore`]: platform keyring (Secret Service, Keychain,
//!   Credential Manager)
//! - [`PassStore`]: the `pass` password manager
//! - [`MemoryStore`]: process memory, for tests and dry runs

mod keyring;
mod memory;
mod pass;

pub use self::keyring::KeyringStore;
pub use self::memory::MemoryStore;
pub use self::pass::PassStore;

use std::future::Future;

/// Service name used for store entries.
pub const SERVICE_NAME: &str = "oauth2ms";

/// Error type for credential store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] ::keyring::Error),

    /// The `pass` command failed.
    #[error("pass {action} '{key}' failed ({status}): {stderr}")]
    Pass {
        /// Subcommand that failed.
        action: &'static str,
        /// Entry name.
        key: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The entry is not valid UTF-8 text.
    #[error("Entry '{0}' is not valid UTF-8")]
    NotUtf8(String),

    /// The store refuses writes.
    #[error("Store is read-only")]
    ReadOnly,

    /// I/O error while talking to the backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for credential store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Text entries addressed by name.
pub trait CredentialStore {
    /// Reads entry `key`; a missing entry is `Ok(None)`.
    fn load(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    /// Creates or overwrites entry `key`.
    fn store(&self, key: &str, value: &str) -> impl Future<Output = StoreResult<()>> + Send;
}
