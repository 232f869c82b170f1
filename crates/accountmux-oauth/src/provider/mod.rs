//! `OAuth2` provider endpoint configurations.

use crate::error::{Error, Result};
use url::Url;

/// Google authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// `OAuth2` provider configuration.
#[derive(Debug, Clone)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Authorization endpoint URL.
    pub auth_url: Url,
    /// Token endpoint URL.
    pub token_url: Url,
}

impl Provider {
    /// Creates a new provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URLs are invalid.
    pub fn new(
        name: impl Into<String>,
        auth_url: impl AsRef<str>,
        token_url: impl AsRef<str>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            auth_url: Url::parse(auth_url.as_ref())?,
            token_url: Url::parse(token_url.as_ref())?,
        })
    }

    /// Google `OAuth2` provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Self::new("Google", GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL)
    }

    /// Returns true if this is Google's authorization server.
    #[must_use]
    pub fn is_google(&self) -> bool {
        self.name == "Google"
            || self
                .auth_url
                .host_str()
                .is_some_and(|host| host == "accounts.google.com")
    }

    /// Validates that required URLs are usable.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        for (field, url) in [("auth_url", &self.auth_url), ("token_url", &self.token_url)] {
            if !matches!(url.scheme(), "https" | "http") {
                return Err(Error::InvalidConfig(format!(
                    "{field} must be an http(s) URL, got {url}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_google_provider() {
        let provider = Provider::google().unwrap();
        assert_eq!(provider.name, "Google");
        assert!(provider.is_google());
        provider.validate().unwrap();
    }

    #[test]
    fn test_custom_provider() {
        let provider = Provider::new(
            "Custom",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap();

        assert_eq!(provider.name, "Custom");
        assert!(!provider.is_google());
        provider.validate().unwrap();
    }

    #[test]
    fn test_google_detected_by_host() {
        let provider = Provider::new(
            "installed",
            "https://accounts.google.com/o/oauth2/auth",
            GOOGLE_TOKEN_URL,
        )
        .unwrap();
        assert!(provider.is_google());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let provider = Provider::new(
            "Weird",
            "ftp://auth.example.com/authorize",
            "https://auth.example.com/token",
        )
        .unwrap();
        assert!(matches!(provider.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Provider::new("Bad", "not a url", GOOGLE_TOKEN_URL),
            Err(Error::UrlError(_))
        ));
    }
}
