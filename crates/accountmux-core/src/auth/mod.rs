//! Per-account OAuth token lifecycle.
//!
//! [`TokenAuthenticator`] decides, for one account, whether to reuse the stored
//! credential, refresh it, or run interactive authorization, and persists the
//! result. The interactive part is the injectable [`AuthorizationFlow`].

mod authenticator;
mod flow;

use std::path::PathBuf;

pub use authenticator::{AuthState, TokenAuthenticator, Validity};
pub use flow::{AuthorizationFlow, BrowserAuthorizationFlow, FlowError};

use crate::Error;
use crate::account::AccountId;

/// Terminal failure of an authentication attempt.
///
/// Cloneable so one failed attempt can be reported to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No client secret file at the configured path.
    #[error("client secret file not found at {}", .0.display())]
    MissingClientSecret(PathBuf),

    /// The client secret file is unusable.
    #[error("invalid client secret: {0}")]
    InvalidClientSecret(String),

    /// Consent declined, network failure, or rejected grant.
    #[error("authorization failed for account {account}: {reason}")]
    AuthorizationFailed {
        /// Account being authorized.
        account: AccountId,
        /// Human-readable cause.
        reason: String,
    },
}

impl AuthError {
    pub(crate) fn failed(account: &AccountId, reason: impl ToString) -> Self {
        Self::AuthorizationFailed {
            account: account.clone(),
            reason: reason.to_string(),
        }
    }
}

impl From<AuthError> for Error {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingClientSecret(path) => Self::MissingClientSecret(path),
            AuthError::InvalidClientSecret(reason) => Self::InvalidClientSecret(reason),
            AuthError::AuthorizationFailed { account, reason } => {
                Self::AuthorizationFailed { account, reason }
            }
        }
    }
}
