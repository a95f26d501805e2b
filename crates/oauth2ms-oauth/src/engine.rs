//! Token acquisition.
//!
//! [`TokenEngine::acquire`] first tries to serve the request from the first
//! cached account, either with its still valid access token or by redeeming
//! its refresh token. When that is impossible or fails, it falls back to the
//! interactive Authorization Code Flow: bind the redirect listener, show the
//! authorization URL, wait for the redirect and exchange the code. Failures of
//! the silent step are logged and never surfaced; failures of the interactive
//! step end the acquisition.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::cache::TokenCache;
use crate::error::Result;
use crate::flow::{AuthSession, AuthorizationPrompt, IdentityProvider};
use crate::listener::CallbackListener;

/// How an access token was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Unexpired token already held by the cache.
    Cache,
    /// Redeemed the cached refresh token.
    Refresh,
    /// Interactive authorization in the browser.
    Interactive,
}

/// Access token handed to the caller.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    username: Option<String>,
    source: TokenSource,
}

impl AccessToken {
    /// Creates an access token.
    #[must_use]
    pub const fn new(secret: String, username: Option<String>, source: TokenSource) -> Self {
        Self {
            secret,
            username,
            source,
        }
    }

    /// Bearer token value.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Account the token was issued to, when known.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// How the token was obtained.
    #[must_use]
    pub const fn source(&self) -> TokenSource {
        self.source
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("username", &self.username)
            .field("source", &self.source)
            .finish()
    }
}

/// Drives token acquisition for one client registration.
#[derive(Debug)]
pub struct TokenEngine<P, A> {
    provider: P,
    prompt: A,
    redirect_uri: Url,
    scopes: Vec<String>,
    timeout: Option<Duration>,
}

impl<P, A> TokenEngine<P, A>
where
    P: IdentityProvider,
    A: AuthorizationPrompt,
{
    /// Creates an engine waiting indefinitely for the redirect.
    #[must_use]
    pub const fn new(provider: P, prompt: A, redirect_uri: Url, scopes: Vec<String>) -> Self {
        Self {
            provider,
            prompt,
            redirect_uri,
            scopes,
            timeout: None,
        }
    }

    /// Limits how long the interactive flow waits for the redirect.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the provider and prompt the engine was built from.
    #[must_use]
    pub fn into_parts(self) -> (P, A) {
        (self.provider, self.prompt)
    }

    /// Obtains an access token, updating `cache` with whatever was issued.
    ///
    /// # Errors
    ///
    /// Returns an error if the interactive flow fails: the listener cannot be
    /// bound, the redirect carries no code or a foreign state, or the code
    /// exchange is rejected.
    pub async fn acquire(&self, cache: &mut TokenCache) -> Result<AccessToken> {
        if let Some(token) = self.acquire_silent(cache).await {
            return Ok(token);
        }
        self.acquire_interactive(cache).await
    }

    async fn acquire_silent(&self, cache: &mut TokenCache) -> Option<AccessToken> {
        let account = cache.first_account()?.clone();
        if cache.accounts().len() > 1 {
            warn!(
                accounts = cache.accounts().len(),
                "Token cache holds several accounts, using the first"
            );
        }

        if let Some(token) = account.usable_access_token(&self.scopes) {
            debug!("Using cached access token");
            return Some(AccessToken::new(
                token.to_string(),
                account.username,
                TokenSource::Cache,
            ));
        }

        if account.refresh_token.is_none() {
            debug!("Cached account has no refresh token");
            return None;
        }

        match self
            .provider
            .acquire_token_silent(&account, &self.scopes)
            .await
        {
            Ok(token) => {
                info!("Refreshed access token");
                let updated = cache.record(&token, &self.scopes, Some(&account));
                Some(AccessToken::new(
                    token.access_token,
                    updated.username,
                    TokenSource::Refresh,
                ))
            }
            Err(e) => {
                warn!("Silent token refresh failed, falling back to interactive login: {e}");
                None
            }
        }
    }

    async fn acquire_interactive(&self, cache: &mut TokenCache) -> Result<AccessToken> {
        let session = AuthSession::new();
        let url = self
            .provider
            .authorization_url(&self.scopes, &self.redirect_uri, &session)?;

        let listener = CallbackListener::bind(&self.redirect_uri).await?;
        self.prompt.present(&url)?;
        let request = listener.receive(self.timeout).await?;

        let code = session.extract_code(&self.redirect_uri, &request)?;
        debug!("Received authorization code");
        let token = self
            .provider
            .acquire_token_by_code(&code, &self.scopes, &self.redirect_uri, &session)
            .await?;

        info!("Obtained access token interactively");
        let account = cache.record(&token, &self.scopes, None);
        Ok(AccessToken::new(
            token.access_token,
            account.username,
            TokenSource::Interactive,
        ))
    }
}
