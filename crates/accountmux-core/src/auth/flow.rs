//! Interactive authorization collaborator.

use std::path::Path;
use std::sync::Arc;

use accountmux_oauth::flow::generate_state;
use accountmux_oauth::{AuthorizationCodeFlow, ClientSecret, Credential, LoopbackReceiver};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Failure of an authorization or refresh round trip.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The user declined consent.
    #[error("user declined consent")]
    UserDeclined,

    /// The provider could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The client secret document is unusable or was rejected by the provider.
    #[error("invalid client secret: {0}")]
    InvalidClientSecret(String),

    /// The provider refused to refresh the credential (revoked or expired grant).
    #[error("refresh rejected: {0}")]
    Refresh(String),

    /// The provider rejected the authorization for another reason.
    #[error("authorization rejected: {0}")]
    Rejected(String),
}

impl From<accountmux_oauth::Error> for FlowError {
    fn from(e: accountmux_oauth::Error) -> Self {
        use accountmux_oauth::Error as OAuth;

        match e {
            OAuth::AccessDenied => Self::UserDeclined,
            e if e.is_network() => Self::Network(e.to_string()),
            OAuth::InvalidClientSecret(reason) | OAuth::InvalidConfig(reason) => {
                Self::InvalidClientSecret(reason)
            }
            OAuth::OAuth { ref error, .. }
                if error == "invalid_client" || error == "unauthorized_client" =>
            {
                Self::InvalidClientSecret(e.to_string())
            }
            e => Self::Rejected(e.to_string()),
        }
    }
}

/// Classify a failed refresh. A rejected grant means the refresh token is dead and
/// only interactive authorization can help; an `invalid_client` answer points at the
/// client secret instead.
fn refresh_error(e: accountmux_oauth::Error) -> FlowError {
    if e.is_invalid_grant() || matches!(e, accountmux_oauth::Error::NoRefreshToken) {
        FlowError::Refresh(e.to_string())
    } else {
        FlowError::from(e)
    }
}

/// Obtains credentials from the provider on behalf of one account.
///
/// The production implementation is [`BrowserAuthorizationFlow`]; tests substitute
/// scripted fakes.
#[async_trait]
pub trait AuthorizationFlow: Send + Sync {
    /// Run interactive consent for `scopes` using the client secret at `secret_path`.
    ///
    /// May block for as long as the user takes to answer.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] describing why no credential was obtained.
    async fn authorize(
        &self,
        secret_path: &Path,
        scopes: &[String],
    ) -> Result<Credential, FlowError>;

    /// Exchange the refresh token of `credential` for a new access token.
    ///
    /// # Errors
    ///
    /// Returns a [`FlowError`] if the provider refuses or cannot be reached.
    async fn refresh(
        &self,
        secret_path: &Path,
        credential: &Credential,
    ) -> Result<Credential, FlowError>;
}

#[async_trait]
impl<T: AuthorizationFlow + ?Sized> AuthorizationFlow for Arc<T> {
    async fn authorize(
        &self,
        secret_path: &Path,
        scopes: &[String],
    ) -> Result<Credential, FlowError> {
        (**self).authorize(secret_path, scopes).await
    }

    async fn refresh(
        &self,
        secret_path: &Path,
        credential: &Credential,
    ) -> Result<Credential, FlowError> {
        (**self).refresh(secret_path, credential).await
    }
}

/// Authorization code flow through the system browser and a loopback redirect.
#[derive(Debug, Clone)]
pub struct BrowserAuthorizationFlow {
    http: reqwest::Client,
    open_browser: bool,
}

impl Default for BrowserAuthorizationFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserAuthorizationFlow {
    /// Create a flow that opens the consent page in the system browser.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            open_browser: true,
        }
    }

    /// Only log the consent URL instead of launching a browser (headless hosts).
    #[must_use]
    pub const fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    async fn read_secret(path: &Path) -> Result<ClientSecret, FlowError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            FlowError::InvalidClientSecret(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(ClientSecret::parse(&raw)?)
    }

    fn present(&self, url: &str) {
        if self.open_browser {
            match opener::open_browser(url) {
                Ok(()) => {
                    info!("opened browser for authorization");
                    return;
                }
                Err(e) => warn!(error = %e, "could not launch browser"),
            }
        }
        info!(url = %url, "visit this URL to authorize access");
    }
}

#[async_trait]
impl AuthorizationFlow for BrowserAuthorizationFlow {
    async fn authorize(
        &self,
        secret_path: &Path,
        scopes: &[String],
    ) -> Result<Credential, FlowError> {
        let secret = Self::read_secret(secret_path).await?;
        let receiver = LoopbackReceiver::bind().await?;
        let client = secret
            .client()?
            .with_redirect_uri(receiver.redirect_uri())
            .with_http_client(self.http.clone());

        let flow = AuthorizationCodeFlow::new(client).with_pkce();
        let state = generate_state();
        let url = flow.authorization_url(scopes, &state)?;
        debug!(redirect = %receiver.redirect_uri(), "waiting for authorization redirect");
        self.present(url.as_str());

        let code = receiver.wait_for_code(&state).await?;
        Ok(flow.exchange_code(&code, scopes).await?)
    }

    async fn refresh(
        &self,
        secret_path: &Path,
        credential: &Credential,
    ) -> Result<Credential, FlowError> {
        let secret = Self::read_secret(secret_path).await?;
        let client = secret.client()?.with_http_client(self.http.clone());

        client.refresh(credential).await.map_err(refresh_error)
    }
}
