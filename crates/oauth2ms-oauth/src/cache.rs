//! Persistent token cache.
//!
//! The cache is stored as a JSON document by the caller's credential store.
//! It records the signed-in account together with its refresh token so later
//! runs can skip the browser. The in-memory `dirty` flag tells the caller
//! whether the document needs to be written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::token::{Token, is_expired};

/// Current cache document version.
const CACHE_VERSION: u32 = 1;

/// Account entry held by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
    /// Stable account identifier (`<oid>.<tid>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_account_id: Option<String>,
    /// Sign-in name, usually the mail address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Last access token issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Expiry of `access_token`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes `access_token` was issued for.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl CachedAccount {
    /// Returns the cached access token if it is unexpired and was granted for
    /// every requested scope.
    #[must_use]
    pub fn usable_access_token(&self, scopes: &[String]) -> Option<&str> {
        let token = self.access_token.as_deref()?;
        if is_expired(self.expires_at) {
            return None;
        }
        scopes
            .iter()
            .all(|scope| self.scopes.iter().any(|s| s.eq_ignore_ascii_case(scope)))
            .then_some(token)
    }

    fn matches(&self, other: &Self) -> bool {
        match (&self.home_account_id, &other.home_account_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.username == other.username,
        }
    }
}

/// Token cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCache {
    #[serde(default = "cache_version")]
    version: u32,
    #[serde(default)]
    accounts: Vec<CachedAccount>,
    #[serde(skip)]
    dirty: bool,
}

const fn cache_version() -> u32 {
    CACHE_VERSION
}

impl Default for TokenCache {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            accounts: Vec::new(),
            dirty: false,
        }
    }
}

impl TokenCache {
    /// Parses a cache document.
    ///
    /// Blank input is an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheCodec`] if the text is not a cache document.
    pub fn deserialize(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let cache: Self = serde_json::from_str(text).map_err(Error::CacheCodec)?;
        debug!(accounts = cache.accounts.len(), "Loaded token cache");
        Ok(cache)
    }

    /// Serializes the cache document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::CacheCodec)
    }

    /// Cached accounts, in insertion order.
    #[must_use]
    pub fn accounts(&self) -> &[CachedAccount] {
        &self.accounts
    }

    /// The account used for silent refresh.
    #[must_use]
    pub fn first_account(&self) -> Option<&CachedAccount> {
        self.accounts.first()
    }

    /// Returns true if the cache changed since it was loaded.
    #[must_use]
    pub const fn has_state_changed(&self) -> bool {
        self.dirty
    }

    /// Records a freshly issued token and returns the updated account.
    ///
    /// The account is taken from the ID token when present, otherwise the
    /// token is attributed to `previous` (the account that was refreshed) or,
    /// failing that, the first cached account. A refresh token not returned
    /// by the server is carried over from the existing entry.
    pub fn record(
        &mut self,
        token: &Token,
        scopes: &[String],
        previous: Option<&CachedAccount>,
    ) -> CachedAccount {
        let claims = token.id_token_claims().unwrap_or_default();
        let mut account = CachedAccount {
            home_account_id: claims.home_account_id(),
            username: claims.preferred_username,
            ..CachedAccount::default()
        };

        if account.home_account_id.is_none() && account.username.is_none() {
            if let Some(prev) = previous.or_else(|| self.first_account()) {
                account.home_account_id.clone_from(&prev.home_account_id);
                account.username.clone_from(&prev.username);
            }
        }

        let index = self.accounts.iter().position(|a| a.matches(&account));
        let existing = index.map(|i| &self.accounts[i]).or(previous);

        if account.username.is_none() {
            account.username = existing.and_then(|a| a.username.clone());
        }
        account.refresh_token = token
            .refresh_token
            .clone()
            .or_else(|| existing.and_then(|a| a.refresh_token.clone()));
        account.access_token = Some(token.access_token.clone());
        account.expires_at = token.expires_at;
        account.scopes = scopes.to_vec();

        match index {
            Some(i) => self.accounts[i] = account.clone(),
            // Keep the refreshed account first so it stays the one selected.
            None => self.accounts.insert(0, account.clone()),
        }
        self.dirty = true;
        account
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
    use chrono::Duration;

    fn scopes() -> Vec<String> {
        vec!["S1".to_string()]
    }

    #[test]
    fn test_blank_text_is_empty_cache() {
        let cache = TokenCache::deserialize("  \n").unwrap();
        assert!(cache.accounts().is_empty());
        assert!(!cache.has_state_changed());
    }

    #[test]
    fn test_malformed_text_is_an_error() {
        for text in ["not json", "{\"accounts\": 3}", "[1, 2]", "{"] {
            assert!(
                matches!(TokenCache::deserialize(text), Err(Error::CacheCodec(_))),
                "{text} should not parse"
            );
        }
    }

    #[test]
    fn test_serialize_omits_dirty_flag() {
        let mut cache = TokenCache::default();
        cache.record(&Token::new("a", "Bearer").with_refresh_token("r"), &scopes(), None);
        assert!(cache.has_state_changed());

        let text = cache.serialize().unwrap();
        assert!(!text.contains("dirty"));

        let loaded = TokenCache::deserialize(&text).unwrap();
        assert!(!loaded.has_state_changed());
        assert_eq!(loaded.accounts(), cache.accounts());
    }

    #[test]
    fn test_record_keeps_refresh_token_when_not_reissued() {
        let mut cache = TokenCache::default();
        let first = cache.record(
            &Token::new("a1", "Bearer").with_refresh_token("r1"),
            &scopes(),
            None,
        );
        let second = cache.record(&Token::new("a2", "Bearer"), &scopes(), Some(&first));

        assert_eq!(cache.accounts().len(), 1);
        assert_eq!(second.refresh_token.as_deref(), Some("r1"));
        assert_eq!(second.access_token.as_deref(), Some("a2"));
    }

    #[test]
    fn test_first_account_is_selected() {
        let text = r#"{"version":1,"accounts":[
            {"username":"first@d","refresh_token":"r1"},
            {"username":"second@d","refresh_token":"r2"}]}"#;
        let cache = TokenCache::deserialize(text).unwrap();
        assert_eq!(
            cache.first_account().unwrap().username.as_deref(),
            Some("first@d")
        );
    }

    #[test]
    fn test_usable_access_token() {
        let account = CachedAccount {
            access_token: Some("cached".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes: scopes(),
            ..CachedAccount::default()
        };
        assert_eq!(account.usable_access_token(&scopes()), Some("cached"));
        assert_eq!(account.usable_access_token(&["S2".to_string()]), None);

        let expired = CachedAccount {
            expires_at: Some(Utc::now() - Duration::hours(1)),
            ..account
        };
        assert_eq!(expired.usable_access_token(&scopes()), None);
    }
}
