//! # oauth2ms-core
//!
//! Configuration and credential storage for `oauth2ms`.
//!
//! This crate provides:
//! - The authorization configuration model (`key: value` text, validation)
//! - Credential store backends (system keyring, `pass`, in-memory)
//! - Loading and saving the configuration and token cache through a store

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod credentials;
mod error;
pub mod store;

pub use config::{Config, ConfigError, RawConfig};
pub use credentials::{load_cache, load_config, save_cache};
pub use error::{Error, Result};
pub use store::{CredentialStore, KeyringStore, MemoryStore, PassStore, StoreError};
