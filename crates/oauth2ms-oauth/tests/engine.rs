//! Token engine tests.
//!
//! These use a scripted identity provider and a prompt that plays the browser:
//! instead of opening the authorization URL it sends the redirect request to
//! the engine's listener over loopback.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use oauth2ms_oauth::{
    AuthSession, AuthorizationPrompt, CachedAccount, Error, IdentityProvider, Result, Token,
    TokenCache, TokenEngine, TokenSource, sasl,
};

/// Identity provider answering from a script.
#[derive(Default)]
struct ScriptedProvider {
    /// Access token returned by a silent refresh; `None` makes it fail.
    silent: Option<&'static str>,
    /// Access token returned by the code exchange, or the raw error payload.
    exchange: Option<std::result::Result<&'static str, &'static str>>,
    /// Username put into the ID token of issued tokens.
    username: Option<&'static str>,
    url_calls: AtomicUsize,
    silent_calls: AtomicUsize,
    codes: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn issue(&self, access_token: &str) -> Token {
        let mut token = Token::new(access_token, "Bearer").with_refresh_token("R2");
        if let Some(username) = self.username {
            let claims = format!(r#"{{"preferred_username":"{username}","oid":"O","tid":"T"}}"#);
            token = token.with_id_token(format!(
                "e30.{}.sig",
                URL_SAFE_NO_PAD.encode(claims.as_bytes())
            ));
        }
        token
    }
}

impl IdentityProvider for ScriptedProvider {
    fn authorization_url(
        &self,
        scopes: &[String],
        redirect_uri: &Url,
        session: &AuthSession,
    ) -> Result<Url> {
        self.url_calls.fetch_add(1, Ordering::SeqCst);
        let mut url = Url::parse("https://login.microsoftonline.com/T/oauth2/v2.0/authorize")?;
        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", session.state());
        Ok(url)
    }

    async fn acquire_token_silent(
        &self,
        account: &CachedAccount,
        _scopes: &[String],
    ) -> Result<Token> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        assert!(account.refresh_token.is_some());
        match self.silent {
            Some(access_token) => Ok(self.issue(access_token)),
            None => Err(Error::TokenExchange {
                payload: r#"{"error":"invalid_grant"}"#.to_string(),
            }),
        }
    }

    async fn acquire_token_by_code(
        &self,
        code: &str,
        _scopes: &[String],
        _redirect_uri: &Url,
        _session: &AuthSession,
    ) -> Result<Token> {
        self.codes.lock().unwrap().push(code.to_string());
        match self.exchange.expect("code exchange not scripted") {
            Ok(access_token) => Ok(self.issue(access_token)),
            Err(payload) => Err(Error::TokenExchange {
                payload: payload.to_string(),
            }),
        }
    }
}

/// What the simulated browser sends back.
#[derive(Clone, Copy)]
enum Redirect {
    /// `code` with the session's own state.
    Code(&'static str),
    /// `code` with a forged state.
    ForgedState(&'static str),
    /// A fixed query string.
    Query(&'static str),
}

/// Prompt that performs the redirect itself.
struct SimulatedBrowser {
    redirect: Redirect,
    presented: AtomicUsize,
}

impl SimulatedBrowser {
    const fn new(redirect: Redirect) -> Self {
        Self {
            redirect,
            presented: AtomicUsize::new(0),
        }
    }
}

impl AuthorizationPrompt for SimulatedBrowser {
    fn present(&self, url: &Url) -> Result<()> {
        self.presented.fetch_add(1, Ordering::SeqCst);

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        let redirect_uri = Url::parse(&pairs["redirect_uri"])?;
        let state = &pairs["state"];
        let query = match self.redirect {
            Redirect::Code(code) => format!("code={code}&state={state}"),
            Redirect::ForgedState(code) => format!("code={code}&state=forged"),
            Redirect::Query(query) => query.to_string(),
        };

        let addr = format!(
            "{}:{}",
            redirect_uri.host_str().unwrap(),
            redirect_uri.port().unwrap()
        );
        let request = format!(
            "GET {}?{query} HTTP/1.1\r\nHost: {addr}\r\n\r\n",
            redirect_uri.path()
        );
        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(request.as_bytes()).await.unwrap();
            let mut response = String::new();
            stream.read_to_string(&mut response).await.unwrap();
            assert!(response.ends_with("Authorization complete."));
        });
        Ok(())
    }
}

fn free_redirect_uri() -> Url {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);
    Url::parse(&format!("http://127.0.0.1:{port}/getToken")).unwrap()
}

fn scopes() -> Vec<String> {
    vec!["S1".to_string()]
}

fn refreshable_cache() -> TokenCache {
    TokenCache::deserialize(
        r#"{"version":1,"accounts":[{"home_account_id":"O.T","username":"u@d","refresh_token":"R1","scopes":["S1"]}]}"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_empty_cache_goes_interactive() {
    let provider = ScriptedProvider {
        exchange: Some(Ok("XYZ")),
        username: Some("u@d"),
        ..ScriptedProvider::default()
    };
    let browser = SimulatedBrowser::new(Redirect::Code("ABC"));
    let engine = TokenEngine::new(provider, browser, free_redirect_uri(), scopes());

    let mut cache = TokenCache::default();
    let token = engine.acquire(&mut cache).await.unwrap();

    assert_eq!(token.secret(), "XYZ");
    assert_eq!(token.username(), Some("u@d"));
    assert_eq!(token.source(), TokenSource::Interactive);
    assert!(cache.has_state_changed());
    assert_eq!(
        cache.first_account().unwrap().refresh_token.as_deref(),
        Some("R2")
    );
    assert_eq!(
        sasl::xoauth2_response("u@d", token.secret()),
        "dXNlcj11QGQBYXV0aD1CZWFyZXIgWFlaAQE="
    );
}

#[tokio::test]
async fn test_interactive_exchanges_received_code() {
    let provider = ScriptedProvider {
        exchange: Some(Ok("XYZ")),
        ..ScriptedProvider::default()
    };
    let engine = TokenEngine::new(
        provider,
        SimulatedBrowser::new(Redirect::Code("ABC")),
        free_redirect_uri(),
        scopes(),
    );

    let mut cache = TokenCache::default();
    engine.acquire(&mut cache).await.unwrap();

    let TokenEngineParts { provider, browser } = TokenEngineParts::from(engine);
    assert_eq!(*provider.codes.lock().unwrap(), vec!["ABC".to_string()]);
    assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 0);
    assert_eq!(browser.presented.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_silent_refresh_skips_listener() {
    let provider = ScriptedProvider {
        silent: Some("NEW"),
        ..ScriptedProvider::default()
    };
    let engine = TokenEngine::new(
        provider,
        SimulatedBrowser::new(Redirect::Code("unused")),
        free_redirect_uri(),
        scopes(),
    );

    let mut cache = refreshable_cache();
    let token = engine.acquire(&mut cache).await.unwrap();

    assert_eq!(token.secret(), "NEW");
    assert_eq!(token.username(), Some("u@d"));
    assert_eq!(token.source(), TokenSource::Refresh);
    assert!(cache.has_state_changed());
    assert_eq!(cache.accounts().len(), 1);

    let TokenEngineParts { provider, browser } = TokenEngineParts::from(engine);
    assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.url_calls.load(Ordering::SeqCst), 0);
    assert_eq!(browser.presented.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_valid_cached_access_token_is_reused() {
    let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
    let mut cache = TokenCache::deserialize(&format!(
        r#"{{"accounts":[{{"username":"u@d","refresh_token":"R1","access_token":"CACHED","expires_at":"{}","scopes":["S1"]}}]}}"#,
        expires_at.to_rfc3339()
    ))
    .unwrap();

    let engine = TokenEngine::new(
        ScriptedProvider::default(),
        SimulatedBrowser::new(Redirect::Code("unused")),
        free_redirect_uri(),
        scopes(),
    );
    let token = engine.acquire(&mut cache).await.unwrap();

    assert_eq!(token.secret(), "CACHED");
    assert_eq!(token.source(), TokenSource::Cache);
    assert!(!cache.has_state_changed());
}

#[tokio::test]
async fn test_failed_refresh_falls_back_to_interactive() {
    let provider = ScriptedProvider {
        silent: None,
        exchange: Some(Ok("XYZ")),
        ..ScriptedProvider::default()
    };
    let engine = TokenEngine::new(
        provider,
        SimulatedBrowser::new(Redirect::Code("ABC")),
        free_redirect_uri(),
        scopes(),
    );

    let mut cache = refreshable_cache();
    let token = engine.acquire(&mut cache).await.unwrap();

    assert_eq!(token.secret(), "XYZ");
    assert_eq!(token.source(), TokenSource::Interactive);
    // No ID token was issued, the token stays with the cached account.
    assert_eq!(token.username(), Some("u@d"));
    assert_eq!(cache.accounts().len(), 1);
}

#[tokio::test]
async fn test_missing_code_is_denied() {
    let engine = TokenEngine::new(
        ScriptedProvider::default(),
        SimulatedBrowser::new(Redirect::Query(
            "error=access_denied&error_description=cancelled",
        )),
        free_redirect_uri(),
        scopes(),
    );

    let mut cache = TokenCache::default();
    let err = engine.acquire(&mut cache).await.unwrap_err();

    assert!(matches!(err, Error::AuthorizationDenied { .. }));
    assert!(err.is_authorization_failure());
    assert!(!cache.has_state_changed());
}

#[tokio::test]
async fn test_forged_state_is_rejected() {
    let engine = TokenEngine::new(
        ScriptedProvider::default(),
        SimulatedBrowser::new(Redirect::ForgedState("ABC")),
        free_redirect_uri(),
        scopes(),
    );

    let err = engine.acquire(&mut TokenCache::default()).await.unwrap_err();
    assert!(matches!(err, Error::StateMismatch { .. }));
}

#[tokio::test]
async fn test_rejected_exchange_keeps_payload() {
    let provider = ScriptedProvider {
        exchange: Some(Err(r#"{"error":"invalid_grant"}"#)),
        ..ScriptedProvider::default()
    };
    let engine = TokenEngine::new(
        provider,
        SimulatedBrowser::new(Redirect::Code("ABC")),
        free_redirect_uri(),
        scopes(),
    );

    let mut cache = TokenCache::default();
    match engine.acquire(&mut cache).await {
        Err(Error::TokenExchange { payload }) => assert!(payload.contains("invalid_grant")),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!cache.has_state_changed());
}

#[tokio::test]
async fn test_busy_port_fails_interactive_flow() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let redirect = Url::parse(&format!("http://127.0.0.1:{port}/getToken")).unwrap();

    let engine = TokenEngine::new(
        ScriptedProvider::default(),
        SimulatedBrowser::new(Redirect::Code("ABC")),
        redirect,
        scopes(),
    );
    let err = engine.acquire(&mut TokenCache::default()).await.unwrap_err();
    assert!(matches!(err, Error::Bind { .. }));
}

/// Gives tests access to the collaborators after a run.
struct TokenEngineParts {
    provider: ScriptedProvider,
    browser: SimulatedBrowser,
}

impl From<TokenEngine<ScriptedProvider, SimulatedBrowser>> for TokenEngineParts {
    fn from(engine: TokenEngine<ScriptedProvider, SimulatedBrowser>) -> Self {
        let (provider, browser) = engine.into_parts();
        Self { provider, browser }
    }
}
