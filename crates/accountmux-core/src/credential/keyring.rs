//! Platform keyring credential backend.
//!
//! Keeps credentials in the platform's native secret storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager
//!
//! The token-state path is only used as the entry key; nothing is written to disk.

use std::path::Path;

use accountmux_oauth::Credential;
use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use super::{CredentialStore, LoadError, decode};
use crate::{Error, Result};

/// Default service name used for keyring entries.
pub const DEFAULT_SERVICE: &str = "accountmux";

/// Stores credentials in the system keyring, one entry per token-state path.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE)
    }
}

impl KeyringCredentialStore {
    /// Create a store that files entries under `service`.
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Service name entries are filed under.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, path: &Path) -> keyring::Result<Entry> {
        Entry::new(&self.service, &entry_key(path))
    }

    /// Run a keyring call on the blocking pool; the platform APIs are synchronous.
    async fn blocking<T, F>(&self, path: &Path, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> keyring::Result<T> + Send + 'static,
    {
        let entry = self.entry(path)?;
        tokio::task::spawn_blocking(move || op(entry))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
            .map_err(Error::from)
    }
}

/// Entry key for a token-state path.
fn entry_key(path: &Path) -> String {
    format!("token:{}", path.display())
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn load(&self, path: &Path) -> std::result::Result<Credential, LoadError> {
        let stored = self
            .blocking(path, |entry| match entry.get_password() {
                Ok(raw) => Ok(Some(raw)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e),
            })
            .await;

        match stored {
            Ok(Some(raw)) => decode(&raw),
            Ok(None) => {
                debug!(path = %path.display(), "no keyring entry");
                Err(LoadError::NotFound)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "keyring read failed");
                Err(LoadError::Corrupt(e.to_string()))
            }
        }
    }

    async fn save(&self, path: &Path, credential: &Credential) -> Result<()> {
        let payload = serde_json::to_string(credential)?;
        self.blocking(path, move |entry| entry.set_password(&payload))
            .await?;
        debug!(path = %path.display(), "credential stored in keyring");
        Ok(())
    }

    async fn discard(&self, path: &Path) -> Result<()> {
        self.blocking(path, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .inspect_err(|e| warn!(path = %path.display(), error = %e, "failed to delete keyring entry"))?;
        debug!(path = %path.display(), "keyring entry discarded");
        Ok(())
    }
}
