//! Durable credential storage.
//!
//! A [`CredentialStore`] keeps one serialized [`Credential`] per token-state
//! location. Two backends are provided:
//! - [`FileCredentialStore`]: one JSON document per path, written atomically
//! - [`KeyringCredentialStore`]: the same document kept in the platform keyring
//!
//! [`credential_store`] picks one from [`CredentialBackend`] at startup.

mod file;
mod keyring;

use std::path::Path;
use std::sync::Arc;

use accountmux_oauth::Credential;
use async_trait::async_trait;

pub use self::file::FileCredentialStore;
pub use self::keyring::{DEFAULT_SERVICE, KeyringCredentialStore};

use crate::Result;
use crate::config::CredentialBackend;

/// A credential store chosen at runtime.
pub type DynCredentialStore = Arc<dyn CredentialStore>;

/// Build the store for `backend`. Opening a store touches nothing until first use.
#[must_use]
pub fn credential_store(backend: CredentialBackend) -> DynCredentialStore {
    match backend {
        CredentialBackend::File => Arc::new(FileCredentialStore::new()),
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::default()),
    }
}

/// Why a stored credential could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Nothing is stored at this location.
    #[error("no stored credential")]
    NotFound,

    /// Something is stored but it is not a readable credential.
    #[error("stored credential is corrupt: {0}")]
    Corrupt(String),
}

/// Reads and writes serialized credentials keyed by token-state location.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential stored at `path`.
    ///
    /// # Errors
    ///
    /// [`LoadError::NotFound`] when nothing is stored, [`LoadError::Corrupt`] for
    /// anything that cannot be read back as a credential.
    async fn load(&self, path: &Path) -> std::result::Result<Credential, LoadError>;

    /// Store `credential` at `path`, replacing any previous value atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential could not be durably written.
    async fn save(&self, path: &Path, credential: &Credential) -> Result<()>;

    /// Remove whatever is stored at `path`. Removing nothing is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if existing state could not be removed.
    async fn discard(&self, path: &Path) -> Result<()>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn load(&self, path: &Path) -> std::result::Result<Credential, LoadError> {
        (**self).load(path).await
    }

    async fn save(&self, path: &Path, credential: &Credential) -> Result<()> {
        (**self).save(path, credential).await
    }

    async fn discard(&self, path: &Path) -> Result<()> {
        (**self).discard(path).await
    }
}

/// Decode a stored document, classifying every failure as corruption.
fn decode(raw: &str) -> std::result::Result<Credential, LoadError> {
    serde_json::from_str(raw).map_err(|e| LoadError::Corrupt(e.to_string()))
}
