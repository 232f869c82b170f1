//! # accountmux-core
//!
//! Multi-account OAuth core: which accounts exist, how each one obtains a valid
//! credential, and one cached live client per account.
//!
//! This crate provides:
//! - **Account registry** - durable, write-through account configuration with
//!   one default account per provider kind
//! - **Credential storage** - file and platform keyring backends
//! - **Token authenticator** - load, validate, refresh or re-authorize, persist
//! - **Provider clients** - mail, calendar and storage sessions
//! - **Account manager** - single-flight resolution and client caching
//!
//! ```ignore
//! use accountmux_core::{AccountManager, ProviderKind, Settings};
//!
//! let manager = AccountManager::open(Settings::from_env()?).await?;
//! let mail = manager.resolve_default(ProviderKind::Mail).await?;
//! let request = mail.session().request(reqwest::Method::GET, "users/me/profile");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod account;
pub mod auth;
pub mod client;
pub mod config;
pub mod credential;
mod error;
mod manager;

pub use account::{
    AccountConfig, AccountId, AccountRegistry, AccountUpdate, ListFilter, ProviderKind,
    ValidationError, ValidationResult, validate_account,
};
pub use auth::{
    AuthError, AuthState, AuthorizationFlow, BrowserAuthorizationFlow, FlowError,
    TokenAuthenticator, Validity,
};
pub use client::{ProviderClient, ProviderError};
pub use config::{CredentialBackend, Settings};
pub use credential::{
    CredentialStore, DynCredentialStore, FileCredentialStore, KeyringCredentialStore, LoadError,
    credential_store,
};
pub use error::{Error, Result};
pub use manager::{AccountManager, AccountStatus, ExecuteError};

pub use accountmux_oauth::Credential;
