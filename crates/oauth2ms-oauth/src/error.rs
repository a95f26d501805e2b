//! Error types for `OAuth2` operations.

use std::io;
use std::path::PathBuf;

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The persisted token cache is not a valid cache document.
    #[error("Malformed token cache: {0}")]
    CacheCodec(#[source] serde_json::Error),

    /// The redirect carried no authorization code.
    #[error("Authorization denied: {error} - {description}")]
    AuthorizationDenied {
        /// Error code reported by the provider, if any.
        error: String,
        /// Human-readable description reported by the provider, if any.
        description: String,
    },

    /// The `state` returned on the redirect does not match the request.
    #[error("Authorization state mismatch (expected {expected}, got {received:?})")]
    StateMismatch {
        /// State generated for this session.
        expected: String,
        /// State found on the redirect.
        received: Option<String>,
    },

    /// The token endpoint rejected the exchange or returned no access token.
    #[error("Token exchange failed: {payload}")]
    TokenExchange {
        /// Raw response body from the token endpoint.
        payload: String,
    },

    /// The redirect listener could not bind its address.
    #[error("Cannot listen on {addr}: {source}")]
    Bind {
        /// Address the listener tried to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The redirect request could not be understood.
    #[error("Invalid redirect request: {0}")]
    InvalidRedirect(String),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// No certificate found for a secure redirect URI.
    #[error("No TLS certificate found (looked for {0})")]
    CertificateNotFound(PathBuf),

    /// Waiting for the redirect timed out.
    #[error("Authorization timed out after {0} seconds")]
    Timeout(u64),

    /// XOAUTH2 input contains non-ASCII characters.
    #[error("XOAUTH2 {0} contains non-ASCII characters")]
    NonAscii(&'static str),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl Error {
    /// Returns true if the error ends the interactive flow because the user
    /// or the provider refused the authorization.
    #[must_use]
    pub const fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationDenied { .. } | Self::StateMismatch { .. }
        )
    }
}
