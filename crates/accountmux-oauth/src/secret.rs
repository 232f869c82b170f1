//! Provider-issued client secret documents.
//!
//! Google Cloud Console hands out a JSON file shaped like
//! `{"installed": {"client_id": ..., "client_secret": ..., "auth_uri": ..., "token_uri": ...}}`
//! (or `"web"` for web application clients).

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::flow::OAuthClient;
use crate::provider::{GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, Provider};

#[derive(Debug, Deserialize)]
struct SecretDocument {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// OAuth client registration loaded from a client secret file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// Client ID.
    pub client_id: String,
    /// Client secret (absent for some public clients).
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Authorization endpoint.
    #[serde(default)]
    pub auth_uri: Option<String>,
    /// Token endpoint.
    #[serde(default)]
    pub token_uri: Option<String>,
    /// Registered redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl ClientSecret {
    /// Reads and parses a client secret file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read (including when it does not
    /// exist) and [`Error::InvalidClientSecret`] if its contents are not a usable
    /// client secret document.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&raw)
    }

    /// Parses a client secret document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientSecret`] if the document is malformed.
    pub fn parse(raw: &str) -> Result<Self> {
        let document: SecretDocument =
            serde_json::from_str(raw).map_err(|e| Error::InvalidClientSecret(e.to_string()))?;

        let secret = document.installed.or(document.web).ok_or_else(|| {
            Error::InvalidClientSecret("expected an \"installed\" or \"web\" section".into())
        })?;

        if secret.client_id.trim().is_empty() {
            return Err(Error::InvalidClientSecret("client_id is empty".into()));
        }

        Ok(secret)
    }

    /// Returns the provider endpoints described by this secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidClientSecret`] if an endpoint is not a valid URL.
    pub fn provider(&self) -> Result<Provider> {
        let auth = self.auth_uri.as_deref().unwrap_or(GOOGLE_AUTH_URL);
        let token = self.token_uri.as_deref().unwrap_or(GOOGLE_TOKEN_URL);
        let name = if auth.contains("accounts.google.com") {
            "Google"
        } else {
            "Custom"
        };

        let provider = Provider::new(name, auth, token)
            .map_err(|e| Error::InvalidClientSecret(format!("bad endpoint: {e}")))?;
        provider
            .validate()
            .map_err(|e| Error::InvalidClientSecret(e.to_string()))?;
        Ok(provider)
    }

    /// Builds an [`OAuthClient`] for this registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider endpoints are invalid.
    pub fn client(&self) -> Result<OAuthClient> {
        let mut client = OAuthClient::new(&self.client_id, self.provider()?);
        if let Some(secret) = &self.client_secret {
            client = client.with_client_secret(secret);
        }
        Ok(client)
    }
}
