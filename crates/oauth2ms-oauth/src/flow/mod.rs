//! Authorization Code Flow against the identity provider.

mod pkce;
mod prompt;
mod session;

pub use pkce::{CHALLENGE_METHOD, PkceChallenge};
pub use prompt::{AuthorizationPrompt, BrowserPrompt, PrintPrompt};
pub use session::AuthSession;

use std::collections::HashMap;
use std::future::Future;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::cache::CachedAccount;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Operations the token engine needs from an identity provider.
pub trait IdentityProvider {
    /// Builds the URL the user visits to authorize the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be constructed.
    fn authorization_url(
        &self,
        scopes: &[String],
        redirect_uri: &Url,
        session: &AuthSession,
    ) -> Result<Url>;

    /// Obtains a new token for `account` without user interaction.
    fn acquire_token_silent(
        &self,
        account: &CachedAccount,
        scopes: &[String],
    ) -> impl Future<Output = Result<Token>> + Send;

    /// Exchanges an authorization code for a token.
    fn acquire_token_by_code(
        &self,
        code: &str,
        scopes: &[String],
        redirect_uri: &Url,
        session: &AuthSession,
    ) -> impl Future<Output = Result<Token>> + Send;
}

/// `OAuth2` client registration talking to the provider over HTTPS.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (confidential clients only).
    pub client_secret: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new public client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret, making this a confidential client.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Returns true if requests authenticate with a client secret.
    #[must_use]
    pub const fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }

    async fn request_token<'a>(
        &'a self,
        mut params: HashMap<&'a str, &'a str>,
    ) -> Result<Token> {
        params.insert("client_id", &self.client_id);
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(
            grant_type = params.get("grant_type").copied().unwrap_or_default(),
            "Requesting token"
        );
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        token_from_body(status, &body)
    }
}

/// Interprets a token endpoint response.
///
/// Anything but a successful response carrying an `access_token` is a
/// [`Error::TokenExchange`] holding the raw body.
fn token_from_body(status: StatusCode, body: &str) -> Result<Token> {
    if status.is_success() {
        if let Ok(response) = serde_json::from_str::<TokenResponse>(body) {
            return Ok(Token::from_response(response));
        }
    } else if let Ok(error) = serde_json::from_str::<ErrorResponse>(body) {
        debug!(
            error = %error.error,
            description = %error.error_description,
            "Token endpoint refused request"
        );
    }

    Err(Error::TokenExchange {
        payload: body.to_string(),
    })
}

impl IdentityProvider for OAuthClient {
    fn authorization_url(
        &self,
        scopes: &[String],
        redirect_uri: &Url,
        session: &AuthSession,
    ) -> Result<Url> {
        let mut url = self.provider.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_mode", "query")
            .append_pair("scope", &Provider::scope_string(scopes))
            .append_pair("state", session.state())
            .append_pair("code_challenge", session.pkce().challenge())
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("prompt", "select_account");
        Ok(url)
    }

    async fn acquire_token_silent(
        &self,
        account: &CachedAccount,
        scopes: &[String],
    ) -> Result<Token> {
        let refresh_token = account
            .refresh_token
            .as_deref()
            .ok_or(Error::NoRefreshToken)?;
        let scope = Provider::scope_string(scopes);

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("scope", scope.as_str());
        self.request_token(params).await
    }

    async fn acquire_token_by_code(
        &self,
        code: &str,
        scopes: &[String],
        redirect_uri: &Url,
        session: &AuthSession,
    ) -> Result<Token> {
        let scope = Provider::scope_string(scopes);

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri.as_str());
        params.insert("scope", scope.as_str());
        params.insert("code_verifier", session.pkce().verifier());
        self.request_token(params).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn client() -> OAuthClient {
        let provider = Provider::from_authority("https://login.microsoftonline.com/T").unwrap();
        OAuthClient::new("C", provider)
    }

    #[test]
    fn test_oauth_client_with_secret() {
        assert!(!client().is_confidential());
        let client = client().with_client_secret("secret");
        assert!(client.is_confidential());
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn test_authorization_url() {
        let session = AuthSession::new();
        let redirect = Url::parse("http://localhost:5000/getToken").unwrap();
        let url = client()
            .authorization_url(&["S1".to_string()], &redirect, &session)
            .unwrap();

        assert!(url.as_str().starts_with(
            "https://login.microsoftonline.com/T/oauth2/v2.0/authorize?"
        ));
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "C");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["redirect_uri"], "http://localhost:5000/getToken");
        assert_eq!(pairs["scope"], "S1 openid profile offline_access");
        assert_eq!(pairs["state"], session.state());
        assert_eq!(pairs["code_challenge"], session.pkce().challenge());
        assert_eq!(pairs["code_challenge_method"], "S256");
    }

    #[test]
    fn test_token_from_success_body() {
        let token = token_from_body(StatusCode::OK, r#"{"access_token":"XYZ"}"#).unwrap();
        assert_eq!(token.access_token, "XYZ");
    }

    #[test]
    fn test_token_from_body_with_huge_lifetime() {
        let body = r#"{"access_token":"XYZ","expires_in":18446744073709551615}"#;
        let token = token_from_body(StatusCode::OK, body).unwrap();
        assert_eq!(token.access_token, "XYZ");
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn test_token_from_body_without_access_token() {
        let body = r#"{"token_type":"Bearer"}"#;
        match token_from_body(StatusCode::OK, body) {
            Err(Error::TokenExchange { payload }) => assert_eq!(payload, body),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_token_from_error_body_keeps_payload() {
        let body = r#"{"error":"invalid_grant","error_description":"AADSTS70008: expired"}"#;
        match token_from_body(StatusCode::BAD_REQUEST, body) {
            Err(Error::TokenExchange { payload }) => assert!(payload.contains("AADSTS70008")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_silent_without_refresh_token() {
        let result = client()
            .acquire_token_silent(&CachedAccount::default(), &["S1".to_string()])
            .await;
        assert!(matches!(result, Err(Error::NoRefreshToken)));
    }
}
