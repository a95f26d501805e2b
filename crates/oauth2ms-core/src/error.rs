//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Authorization configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Credential store operation failed.
    #[error("Credential store error: {0}")]
    Store(#[from] crate::store::StoreError),

    /// `OAuth2` operation failed.
    #[error(transparent)]
    OAuth(#[from] oauth2ms_oauth::Error),

    /// No configuration entry exists in the store.
    #[error("No configuration found under '{0}'")]
    ConfigNotFound(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
