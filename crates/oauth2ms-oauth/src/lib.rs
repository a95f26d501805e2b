//! # oauth2ms-oauth
//!
//! `OAuth2` token acquisition for mail clients that authenticate to IMAP/SMTP
//! with XOAUTH2 against the Microsoft identity platform.
//!
//! ## Features
//!
//! - **Token acquisition engine**: silent refresh from a cached account, falling
//!   back to an interactive Authorization Code Flow (with PKCE)
//! - **Redirect listener**: one-shot local HTTP(S) server capturing the redirect
//! - **Token cache**: JSON document holding the account and its refresh token
//! - **SASL**: XOAUTH2 initial response encoding
//!
//! ## Quick Start
//!
//! ```ignore
//! use oauth2ms_oauth::{BrowserPrompt, OAuthClient, Provider, TokenCache, TokenEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Provider::from_authority("https://login.microsoftonline.com/common")?;
//!     let client = OAuthClient::new("your_client_id", provider);
//!     let redirect_uri = url::Url::parse("http://localhost:5000/getToken")?;
//!     let scopes = vec!["https://outlook.office.com/IMAP.AccessAsUser.All".to_string()];
//!
//!     let engine = TokenEngine::new(client, BrowserPrompt, redirect_uri, scopes);
//!     let mut cache = TokenCache::default();
//!     let token = engine.acquire(&mut cache).await?;
//!
//!     let auth_string = oauth2ms_oauth::sasl::xoauth2_response("user@example.com", token.secret());
//!     println!("{auth_string}");
//!     Ok(())
//! }
//! ```
//!
//! Only the first account held by a [`TokenCache`] is ever used; caches with
//! several accounts are not supported.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod engine;
mod error;
pub mod flow;
pub mod listener;
pub mod provider;
pub mod sasl;
pub mod token;

pub use cache::{CachedAccount, TokenCache};
pub use engine::{AccessToken, TokenEngine, TokenSource};
pub use error::{Error, Result};
pub use flow::{
    AuthSession, AuthorizationPrompt, BrowserPrompt, IdentityProvider, OAuthClient,
    PkceChallenge, PrintPrompt,
};
pub use listener::{CallbackListener, CallbackRequest};
pub use provider::Provider;
pub use token::Token;
