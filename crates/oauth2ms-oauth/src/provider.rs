//! Identity provider endpoint configuration.

use crate::error::{Error, Result};
use url::Url;

/// Scopes always requested alongside the configured ones.
///
/// `offline_access` yields the refresh token, `openid`/`profile` the ID token
/// carrying the account's username.
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Identity provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Authority the endpoints hang off (tenant URL).
    pub authority: Url,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
}

impl Provider {
    /// Microsoft identity platform (v2.0 endpoints) for the given authority,
    /// e.g. `https://login.microsoftonline.com/<tenant>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the authority is not an absolute `https` URL.
    pub fn from_authority(authority: impl AsRef<str>) -> Result<Self> {
        let authority = authority.as_ref().trim_end_matches('/');
        let parsed = Url::parse(authority)?;
        if parsed.scheme() != "https" {
            return Err(Error::InvalidConfig(format!(
                "authority must use https: {authority}"
            )));
        }

        Ok(Self {
            auth_url: Url::parse(&format!("{authority}/oauth2/v2.0/authorize"))?,
            token_url: Url::parse(&format!("{authority}/oauth2/v2.0/token"))?,
            authority: parsed,
        })
    }

    /// Joins the configured scopes with the reserved ones, without duplicates.
    #[must_use]
    pub fn scope_string(scopes: &[String]) -> String {
        let mut all: Vec<&str> = scopes.iter().map(String::as_str).collect();
        for reserved in RESERVED_SCOPES {
            if !all.contains(&reserved) {
                all.push(reserved);
            }
        }
        all.join(" ")
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

    #[test]
    fn test_from_authority_common() {
        let provider =
            Provider::from_authority("https://login.microsoftonline.com/common").unwrap();
        assert_eq!(
            provider.token_url.as_str(),
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_from_authority_tenant() {
        let provider = Provider::from_authority("https://login.microsoftonline.com/T/").unwrap();
        assert_eq!(
            provider.auth_url.as_str(),
            "https://login.microsoftonline.com/T/oauth2/v2.0/authorize"
        );
        assert_eq!(provider.authority.path(), "/T");
    }

    #[test]
    fn test_from_authority_rejects_http() {
        let err = Provider::from_authority("http://login.example.com/T").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_from_authority_rejects_garbage() {
        assert!(matches!(
            Provider::from_authority("not a url"),
            Err(Error::UrlError(_))
        ));
    }

    #[test]
    fn test_scope_string_adds_reserved_once() {
        let scopes = vec!["S1".to_string(), "offline_access".to_string()];
        assert_eq!(
            Provider::scope_string(&scopes),
            "S1 offline_access openid profile"
        );
    }
}
