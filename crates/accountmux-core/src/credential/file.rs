//! Filesystem credential backend.

use std::io::ErrorKind;
use std::path::Path;

use accountmux_oauth::Credential;
use async_trait::async_trait;
use tracing::debug;

use super::{CredentialStore, LoadError, decode};
use crate::account::write_atomic;
use crate::{Error, Result};

/// Stores each credential as a JSON document at its token-state path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCredentialStore;

impl FileCredentialStore {
    /// Create a file-backed store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, path: &Path) -> std::result::Result<Credential, LoadError> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LoadError::NotFound),
            // Unreadable files (bad UTF-8, permissions) are treated like bad JSON.
            Err(e) => Err(LoadError::Corrupt(e.to_string())),
        }
    }

    async fn save(&self, path: &Path, credential: &Credential) -> Result<()> {
        let payload = serde_json::to_vec_pretty(credential)?;
        write_atomic(path, &payload)
            .await
            .map_err(|source| Error::PersistFailure {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "credential saved");
        Ok(())
    }

    async fn discard(&self, path: &Path) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "credential discarded");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
