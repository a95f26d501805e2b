//! `OAuth2` token types.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before expiry at which a token is already treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// `OAuth2` access token with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiration time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token for obtaining new access tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope granted by authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Raw OpenID Connect ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl Token {
    /// Creates a new token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            expires_at: None,
            refresh_token: None,
            scope: None,
            id_token: None,
        }
    }

    /// Creates a token from token response.
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        // A lifetime too large to represent is treated as unknown.
        let expires_at = response.expires_in.and_then(|secs| {
            let lifetime = Duration::try_seconds(i64::try_from(secs).ok()?)?;
            Utc::now().checked_add_signed(lifetime)
        });

        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at,
            refresh_token: response.refresh_token,
            scope: response.scope,
            id_token: response.id_token,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the expiration time.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the raw ID token.
    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    /// Decodes the claims of the ID token, if one was issued.
    ///
    /// The signature is not verified: the token comes straight from the
    /// token endpoint over TLS and is only used to name the account.
    #[must_use]
    pub fn id_token_claims(&self) -> Option<IdTokenClaims> {
        self.id_token.as_deref().and_then(IdTokenClaims::decode)
    }
}

/// Returns true if `expires_at` lies in the past (with a 60 second buffer).
#[must_use]
pub fn is_expired(expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_none_or(|exp| Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= exp)
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// OpenID Connect ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

/// Subset of the ID token claims used to identify the account.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    /// Sign-in name, usually the mail address.
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Object id of the user.
    #[serde(default)]
    pub oid: Option<String>,
    /// Tenant id.
    #[serde(default)]
    pub tid: Option<String>,
}

impl IdTokenClaims {
    /// Decodes the payload segment of a JWT.
    #[must_use]
    pub fn decode(jwt: &str) -> Option<Self> {
        let payload = jwt.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Account identifier in `<oid>.<tid>` form.
    #[must_use]
    pub fn home_account_id(&self) -> Option<String> {
        match (&self.oid, &self.tid) {
            (Some(oid), Some(tid)) => Some(format!("{oid}.{tid}")),
            _ => None,
        }
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

    fn jwt(claims: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
            URL_SAFE_NO_PAD.encode(claims.as_bytes())
        )
    }

    #[test]
    fn test_token_creation() {
        let token = Token::new("access123", "Bearer");
        assert_eq!(token.access_token, "access123");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_none());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_token_with_refresh() {
        let token = Token::new("access123", "Bearer").with_refresh_token("refresh456");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh456"));
    }

    #[test]
    fn test_expiration() {
        assert!(is_expired(Some(Utc::now() - Duration::seconds(120))));
        assert!(is_expired(Some(Utc::now() + Duration::seconds(30))));
        assert!(!is_expired(Some(Utc::now() + Duration::seconds(3600))));
        assert!(is_expired(None));
    }

    #[test]
    fn test_token_from_minimal_response() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"XYZ"}"#).unwrap();
        let token = Token::from_response(response);
        assert_eq!(token.access_token, "XYZ");
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_none());
    }

    #[test]
    fn test_token_from_full_response() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"a","token_type":"Bearer","expires_in":3600,"refresh_token":"r","scope":"S1"}"#,
        )
        .unwrap();
        let token = Token::from_response(response);
        assert!(!is_expired(token.expires_at));
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_unrepresentable_lifetime_has_no_expiry() {
        for body in [
            r#"{"access_token":"XYZ","expires_in":18446744073709551615}"#,
            r#"{"access_token":"XYZ","expires_in":10000000000000}"#,
        ] {
            let response: TokenResponse = serde_json::from_str(body).unwrap();
            let token = Token::from_response(response);
            assert_eq!(token.access_token, "XYZ");
            assert!(token.expires_at.is_none());
        }
    }

    #[test]
    fn test_id_token_claims() {
        let token = Token::new("a", "Bearer")
            .with_id_token(jwt(r#"{"preferred_username":"u@d","oid":"O","tid":"T"}"#));
        let claims = token.id_token_claims().unwrap();
        assert_eq!(claims.preferred_username.as_deref(), Some("u@d"));
        assert_eq!(claims.home_account_id().as_deref(), Some("O.T"));
    }

    #[test]
    fn test_id_token_garbage_is_ignored() {
        let token = Token::new("a", "Bearer").with_id_token("not-a-jwt");
        assert!(token.id_token_claims().is_none());
    }
}
