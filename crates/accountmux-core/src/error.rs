//! Error types for the core library.

use std::path::PathBuf;

use thiserror::Error;

use crate::account::{AccountId, ProviderKind, ValidationError};

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No account with this id exists in the registry.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// An account with this id already exists.
    #[error("Account already exists: {0}")]
    DuplicateAccount(AccountId),

    /// The requested default flag would break the one-enabled-default-per-kind rule.
    #[error("Invalid default for account {0}: a disabled account cannot be the default")]
    InvalidDefault(AccountId),

    /// Account configuration failed validation.
    #[error("Invalid account configuration: {}", join(.0))]
    Validation(Vec<ValidationError>),

    /// A durable write failed; the change was not applied.
    #[error("Failed to persist {}: {source}", .path.display())]
    PersistFailure {
        /// Location that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Account is unknown or disabled. Add or enable it first.
    #[error("Account {0} is not configured; add or enable it first")]
    NotConfigured(AccountId),

    /// No default account exists for this provider kind.
    #[error("No default {0} account configured")]
    NoDefaultConfigured(ProviderKind),

    /// The client secret file required for interactive authorization is missing.
    #[error("Client secret file not found at {}; download OAuth client credentials from the provider console", .0.display())]
    MissingClientSecret(PathBuf),

    /// The client secret file exists but the provider (or parser) rejected it.
    #[error("Invalid client secret: {0}")]
    InvalidClientSecret(String),

    /// Consent was declined, the network failed, or the grant was rejected.
    #[error("Authorization failed for account {account}: {reason}")]
    AuthorizationFailed {
        /// Account being authorized.
        account: AccountId,
        /// Human-readable cause.
        reason: String,
    },

    /// The registry document could not be parsed.
    #[error("Account registry at {} is unreadable: {reason}", .path.display())]
    Registry {
        /// Registry location.
        path: PathBuf,
        /// Parse failure.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A setting holds a value this build does not understand.
    #[error("Invalid value {value:?} for {name}")]
    InvalidSetting {
        /// Setting (environment variable) name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Platform keyring error.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Returns true for errors the operator must fix by supplying a proper secret file.
    #[must_use]
    pub const fn is_client_secret_problem(&self) -> bool {
        matches!(
            self,
            Self::MissingClientSecret(_) | Self::InvalidClientSecret(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
