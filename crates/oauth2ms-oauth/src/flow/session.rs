//! State of one interactive authorization.

use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::PkceChallenge;
use crate::error::{Error, Result};
use crate::listener::CallbackRequest;

/// One interactive authorization attempt.
///
/// Holds the anti-CSRF `state` and the PKCE pair. It is created right before
/// the authorization URL is built and handed by reference to every later
/// step, so nothing about the attempt lives in shared state.
#[derive(Debug, Clone)]
pub struct AuthSession {
    state: String,
    pkce: PkceChallenge,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    /// Starts a session with a random UUID state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Uuid::new_v4().to_string(),
            pkce: PkceChallenge::generate(),
        }
    }

    /// Anti-CSRF state value.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// PKCE pair for this session.
    #[must_use]
    pub const fn pkce(&self) -> &PkceChallenge {
        &self.pkce
    }

    /// Extracts the authorization code from the captured redirect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthorizationDenied`] if the redirect reports an error,
    /// targets another path or has no `code`, and [`Error::StateMismatch`] if
    /// the returned `state` is not this session's.
    pub fn extract_code(&self, redirect_uri: &Url, request: &CallbackRequest) -> Result<String> {
        let url = redirect_uri.join(request.target())?;
        debug!(path = url.path(), "Parsing redirect");

        if url.path() != redirect_uri.path() {
            return Err(Error::AuthorizationDenied {
                error: String::new(),
                description: format!("redirect arrived on unexpected path {}", url.path()),
            });
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = String::new();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = value.into_owned(),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(Error::AuthorizationDenied { error, description });
        }
        let Some(code) = code.filter(|c| !c.is_empty()) else {
            return Err(Error::AuthorizationDenied {
                error: String::new(),
                description: "redirect carried no authorization code".to_string(),
            });
        };
        if state.as_deref() != Some(self.state.as_str()) {
            return Err(Error::StateMismatch {
                expected: self.state.clone(),
                received: state,
            });
        }

        Ok(code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn redirect() -> Url {
        Url::parse("http://localhost:5000/getToken").unwrap()
    }

    #[test]
    fn test_state_is_uuid() {
        let session = AuthSession::new();
        assert!(Uuid::parse_str(session.state()).is_ok());
        assert_ne!(session.state(), AuthSession::new().state());
    }

    #[test]
    fn test_extract_code() {
        let session = AuthSession::new();
        let request = CallbackRequest::new(format!(
            "/getToken?code=ABC&state={}&session_state=x",
            session.state()
        ));
        assert_eq!(session.extract_code(&redirect(), &request).unwrap(), "ABC");
    }

    #[test]
    fn test_missing_code_is_denied() {
        let session = AuthSession::new();
        let request = CallbackRequest::new(format!("/getToken?state={}", session.state()));
        assert!(matches!(
            session.extract_code(&redirect(), &request),
            Err(Error::AuthorizationDenied { .. })
        ));
    }

    #[test]
    fn test_provider_error_is_reported() {
        let session = AuthSession::new();
        let request = CallbackRequest::new(
            "/getToken?error=access_denied&error_description=User+cancelled".to_string(),
        );
        match session.extract_code(&redirect(), &request) {
            Err(Error::AuthorizationDenied { error, description }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(description, "User cancelled");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_state_mismatch() {
        let session = AuthSession::new();
        let request = CallbackRequest::new("/getToken?code=ABC&state=forged".to_string());
        assert!(matches!(
            session.extract_code(&redirect(), &request),
            Err(Error::StateMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_path_is_denied() {
        let session = AuthSession::new();
        let request = CallbackRequest::new("/favicon.ico".to_string());
        assert!(matches!(
            session.extract_code(&redirect(), &request),
            Err(Error::AuthorizationDenied { .. })
        ));
    }
}
