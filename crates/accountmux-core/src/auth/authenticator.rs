//! Token state machine.

use std::fmt;

use accountmux_oauth::Credential;
use tracing::{debug, info, warn};

use super::{AuthError, AuthorizationFlow, BrowserAuthorizationFlow, FlowError};
use crate::account::AccountConfig;
use crate::credential::{CredentialStore, FileCredentialStore, LoadError};

/// Outcome of checking a loaded credential against the required scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Scopes match and the access token is usable.
    Valid,
    /// Scopes match but the access token is expired or empty.
    Expired,
    /// Granted scopes differ from the required set.
    ScopeMismatch,
}

/// State of one authentication attempt.
///
/// `NoCredential → Loaded → Validated → Refreshed → Authorized → Persisted`, where
/// `Persisted` is the only successful terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing usable is stored.
    NoCredential,
    /// A credential was read from the store.
    Loaded(Credential),
    /// A loaded credential has been classified.
    Validated(Credential, Validity),
    /// An expired credential was refreshed.
    Refreshed(Credential),
    /// Interactive authorization produced a fresh credential.
    Authorized(Credential),
    /// The credential is durable (or persisting it failed and it is kept in memory).
    Persisted(Credential),
}

impl AuthState {
    const fn name(&self) -> &'static str {
        match self {
            Self::NoCredential => "no-credential",
            Self::Loaded(_) => "loaded",
            Self::Validated(_, Validity::Valid) => "validated(valid)",
            Self::Validated(_, Validity::Expired) => "validated(expired)",
            Self::Validated(_, Validity::ScopeMismatch) => "validated(scope-mismatch)",
            Self::Refreshed(_) => "refreshed",
            Self::Authorized(_) => "authorized",
            Self::Persisted(_) => "persisted",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs the token lifecycle for an account against a [`CredentialStore`] and an
/// [`AuthorizationFlow`].
#[derive(Debug)]
pub struct TokenAuthenticator<S = FileCredentialStore, F = BrowserAuthorizationFlow> {
    store: S,
    flow: F,
}

impl<S, F> TokenAuthenticator<S, F>
where
    S: CredentialStore,
    F: AuthorizationFlow,
{
    /// Create an authenticator.
    pub const fn new(store: S, flow: F) -> Self {
        Self { store, flow }
    }

    /// The credential store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The authorization flow.
    pub const fn flow(&self) -> &F {
        &self.flow
    }

    /// Produce a valid credential for `config` holding exactly its kind's scopes.
    ///
    /// Corrupt stored state never surfaces as an error; it is discarded and the
    /// account is re-authorized. Failing to persist the result is logged and the
    /// in-memory credential is returned anyway.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingClientSecret`] when interactive authorization is needed and
    /// no secret file exists, [`AuthError::InvalidClientSecret`] when the secret is
    /// unusable, and [`AuthError::AuthorizationFailed`] otherwise.
    pub async fn authenticate(&self, config: &AccountConfig) -> Result<Credential, AuthError> {
        let required = config.required_scopes();
        self.authenticate_with(config, &required).await
    }

    /// Like [`Self::authenticate`] with an explicit scope set.
    ///
    /// # Errors
    ///
    /// Same as [`Self::authenticate`].
    pub async fn authenticate_with(
        &self,
        config: &AccountConfig,
        required: &[String],
    ) -> Result<Credential, AuthError> {
        let mut state = self.load(config).await;
        loop {
            debug!(account = %config.id, state = %state, "auth state");
            state = match state {
                AuthState::NoCredential => self.authorize(config, required).await?,
                AuthState::Loaded(credential) => Self::validate(credential, required),
                // Already durable; nothing to write.
                AuthState::Validated(credential, Validity::Valid) => {
                    AuthState::Persisted(credential)
                }
                AuthState::Validated(credential, Validity::Expired) => {
                    self.refresh(config, credential).await
                }
                AuthState::Validated(_, Validity::ScopeMismatch) => {
                    info!(account = %config.id, "stored scopes differ from required, re-authorizing");
                    self.discard(config).await;
                    AuthState::NoCredential
                }
                AuthState::Refreshed(credential) | AuthState::Authorized(credential) => {
                    self.persist(config, credential).await
                }
                AuthState::Persisted(credential) => return Ok(credential),
            };
        }
    }

    /// `NoCredential → Loaded`, or back to `NoCredential` if the stored state is
    /// missing or corrupt. Corrupt state is removed from the store.
    pub async fn load(&self, config: &AccountConfig) -> AuthState {
        match self.store.load(&config.token_state_path).await {
            Ok(credential) => AuthState::Loaded(credential),
            Err(LoadError::NotFound) => {
                debug!(account = %config.id, "no stored credential");
                AuthState::NoCredential
            }
            Err(LoadError::Corrupt(reason)) => {
                warn!(account = %config.id, reason = %reason, "stored credential is corrupt, discarding");
                self.discard(config).await;
                AuthState::NoCredential
            }
        }
    }

    /// `Loaded → Validated`. Scope comparison is exact set equality.
    #[must_use]
    pub fn validate(credential: Credential, required: &[String]) -> AuthState {
        let validity = if !credential.scopes_match(required) {
            Validity::ScopeMismatch
        } else if credential.is_valid() {
            Validity::Valid
        } else {
            Validity::Expired
        };
        AuthState::Validated(credential, validity)
    }

    /// `Validated(Expired) → Refreshed`, or `NoCredential` when there is no refresh
    /// token, the provider refuses, or the refreshed credential is still unusable.
    pub async fn refresh(&self, config: &AccountConfig, credential: Credential) -> AuthState {
        if credential.refresh_token.is_none() {
            debug!(account = %config.id, "expired credential has no refresh token");
            return AuthState::NoCredential;
        }

        match self
            .flow
            .refresh(&config.credential_secret_path, &credential)
            .await
        {
            Ok(fresh) if fresh.is_valid() => {
                info!(account = %config.id, "access token refreshed");
                AuthState::Refreshed(fresh)
            }
            Ok(_) => {
                warn!(account = %config.id, "refresh returned an unusable credential");
                AuthState::NoCredential
            }
            Err(FlowError::Refresh(reason)) => {
                info!(account = %config.id, reason = %reason, "refresh grant no longer accepted, re-authorizing");
                AuthState::NoCredential
            }
            Err(e) => {
                warn!(account = %config.id, error = %e, "refresh failed, falling back to authorization");
                AuthState::NoCredential
            }
        }
    }

    /// `NoCredential → Authorized` through the interactive flow.
    ///
    /// # Errors
    ///
    /// See [`Self::authenticate`].
    pub async fn authorize(
        &self,
        config: &AccountConfig,
        required: &[String],
    ) -> Result<AuthState, AuthError> {
        let secret_path = &config.credential_secret_path;
        if !tokio::fs::try_exists(secret_path).await.unwrap_or(false) {
            warn!(account = %config.id, path = %secret_path.display(), "client secret file missing");
            return Err(AuthError::MissingClientSecret(secret_path.clone()));
        }

        info!(account = %config.id, kind = %config.kind, "starting interactive authorization");
        let credential = self
            .flow
            .authorize(secret_path, required)
            .await
            .map_err(|e| match e {
                FlowError::InvalidClientSecret(reason) => AuthError::InvalidClientSecret(reason),
                other => AuthError::failed(&config.id, other),
            })?;

        if !credential.scopes_match(required) {
            warn!(account = %config.id, "granted scopes differ from the requested set");
        }
        info!(account = %config.id, "authorization granted");
        Ok(AuthState::Authorized(credential))
    }

    /// `Refreshed | Authorized → Persisted`. A failed write only costs durability.
    pub async fn persist(&self, config: &AccountConfig, credential: Credential) -> AuthState {
        if let Err(e) = self.store.save(&config.token_state_path, &credential).await {
            warn!(account = %config.id, error = %e, "failed to persist credential, keeping it in memory");
        }
        AuthState::Persisted(credential)
    }

    /// Remove the stored credential of `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not remove it.
    pub async fn forget(&self, config: &AccountConfig) -> crate::Result<()> {
        self.store.discard(&config.token_state_path).await?;
        info!(account = %config.id, "stored credential removed");
        Ok(())
    }

    /// Mark the stored access token of `config` as unusable, keeping its refresh
    /// token, so the next [`Self::authenticate`] refreshes or re-authorizes instead
    /// of handing the same token back.
    ///
    /// Used when the provider rejects a token the local clock still considers valid.
    pub async fn expire_access(&self, config: &AccountConfig) {
        let mut credential = match self.store.load(&config.token_state_path).await {
            Ok(credential) => credential,
            Err(LoadError::NotFound) => return,
            Err(LoadError::Corrupt(_)) => {
                self.discard(config).await;
                return;
            }
        };

        credential.access_token.clear();
        if let Err(e) = self.store.save(&config.token_state_path, &credential).await {
            warn!(account = %config.id, error = %e, "failed to expire stored access token, discarding it");
            self.discard(config).await;
            return;
        }
        debug!(account = %config.id, "stored access token expired");
    }

    async fn discard(&self, config: &AccountConfig) {
        if let Err(e) = self.store.discard(&config.token_state_path).await {
            warn!(account = %config.id, error = %e, "failed to discard stored credential");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::ProviderKind;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        entries: Mutex<HashMap<PathBuf, String>>,
        saves: AtomicUsize,
        discards: AtomicUsize,
        read_only: bool,
    }

    impl MemoryStore {
        fn with(path: &Path, credential: &Credential) -> Self {
            let store = Self::default();
            store.put_raw(path, &serde_json::to_string(credential).unwrap());
            store
        }

        fn put_raw(&self, path: &Path, raw: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), raw.to_string());
        }

        fn get(&self, path: &Path) -> Option<Credential> {
            let entries = self.entries.lock().unwrap();
            entries.get(path).map(|raw| serde_json::from_str(raw).unwrap())
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn load(&self, path: &Path) -> std::result::Result<Credential, LoadError> {
            let entries = self.entries.lock().unwrap();
            let raw = entries.get(path).ok_or(LoadError::NotFound)?;
            serde_json::from_str(raw).map_err(|e| LoadError::Corrupt(e.to_string()))
        }

        async fn save(&self, path: &Path, credential: &Credential) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.read_only {
                return Err(Error::Io(std::io::Error::other("read-only")));
            }
            self.put_raw(path, &serde_json::to_string(credential)?);
            Ok(())
        }

        async fn discard(&self, path: &Path) -> Result<()> {
            self.discards.fetch_add(1, Ordering::SeqCst);
            self.entries.lock().unwrap().remove(path);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeFlow {
        authorize_calls: AtomicUsize,
        refresh_calls: AtomicUsize,
        authorize_error: Option<FlowError>,
        refresh_error: Option<FlowError>,
    }

    #[async_trait]
    impl AuthorizationFlow for FakeFlow {
        async fn authorize(
            &self,
            _secret_path: &Path,
            scopes: &[String],
        ) -> std::result::Result<Credential, FlowError> {
            self.authorize_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = &self.authorize_error {
                return Err(e.clone());
            }
            Ok(Credential::new("authorized")
                .with_refresh_token("refresh-1")
                .with_expiry(Utc::now() + Duration::hours(1))
                .with_scopes(scopes.iter().cloned()))
        }

        async fn refresh(
            &self,
            _secret_path: &Path,
            credential: &Credential,
        ) -> std::result::Result<Credential, FlowError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = &self.refresh_error {
                return Err(e.clone());
            }
            let mut fresh = Credential::new("refreshed")
                .with_expiry(Utc::now() + Duration::hours(1))
                .with_scopes(credential.scopes.iter().cloned());
            fresh.refresh_token.clone_from(&credential.refresh_token);
            Ok(fresh)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: AccountConfig,
    }

    fn fixture(with_secret: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("credentials_work.json");
        if with_secret {
            std::fs::write(&secret, r#"{"installed":{"client_id":"id"}}"#).unwrap();
        }
        let config = AccountConfig::new(
            "work",
            ProviderKind::Mail,
            secret,
            dir.path().join("token_work.json"),
        );
        Fixture { _dir: dir, config }
    }

    fn stored(access: &str, expires_in: Duration, scopes: &[String]) -> Credential {
        Credential::new(access)
            .with_refresh_token("refresh-0")
            .with_expiry(Utc::now() + expires_in)
            .with_scopes(scopes.iter().cloned())
    }

    #[tokio::test]
    async fn test_valid_credential_skips_network() {
        let fx = fixture(true);
        let required = fx.config.required_scopes();
        let store = MemoryStore::with(
            &fx.config.token_state_path,
            &stored("cached", Duration::hours(1), &required),
        );
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(credential.access_token, "cached");
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.flow().refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.store().saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_subset_scopes_force_reauthorization() {
        let fx = fixture(true);
        let required = fx.config.required_scopes();
        // Expired and refreshable, but missing one of the required scopes.
        let store = MemoryStore::with(
            &fx.config.token_state_path,
            &stored("old", -Duration::hours(1), &required[..1]),
        );
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(credential.access_token, "authorized");
        assert!(credential.scopes_match(&required));
        assert_eq!(auth.flow().refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.store().discards.load(Ordering::SeqCst), 1);
        assert_eq!(
            auth.store().get(&fx.config.token_state_path).unwrap(),
            credential
        );
    }

    #[tokio::test]
    async fn test_superset_scopes_force_reauthorization() {
        let fx = fixture(true);
        let mut granted = fx.config.required_scopes();
        granted.push("https://www.googleapis.com/auth/drive".to_string());
        let store = MemoryStore::with(
            &fx.config.token_state_path,
            &stored("wide", Duration::hours(1), &granted),
        );
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted() {
        let fx = fixture(true);
        let required = fx.config.required_scopes();
        let store = MemoryStore::with(
            &fx.config.token_state_path,
            &stored("old", -Duration::minutes(5), &required),
        );
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(credential.access_token, "refreshed");
        assert_eq!(credential.refresh_token.as_deref(), Some("refresh-0"));
        assert_eq!(auth.flow().refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            auth.store()
                .get(&fx.config.token_state_path)
                .unwrap()
                .access_token,
            "refreshed"
        );
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_through() {
        let fx = fixture(true);
        let required = fx.config.required_scopes();
        let store = MemoryStore::with(
            &fx.config.token_state_path,
            &stored("old", -Duration::minutes(5), &required),
        );
        let flow = FakeFlow {
            refresh_error: Some(FlowError::Refresh("invalid_grant".into())),
            ..FakeFlow::default()
        };
        let auth = TokenAuthenticator::new(store, flow);

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(credential.access_token, "authorized");
        assert_eq!(auth.flow().refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let fx = fixture(true);
        let required = fx.config.required_scopes();
        let mut credential = stored("old", -Duration::minutes(5), &required);
        credential.refresh_token = None;
        let store = MemoryStore::with(&fx.config.token_state_path, &credential);
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(auth.flow().refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_state_is_discarded() {
        let fx = fixture(true);
        let store = MemoryStore::default();
        store.put_raw(&fx.config.token_state_path, "{\"access_tok");
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(credential.access_token, "authorized");
        assert_eq!(auth.store().discards.load(Ordering::SeqCst), 1);
        assert_eq!(auth.store().saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_secret_is_fatal() {
        let fx = fixture(false);
        let auth = TokenAuthenticator::new(MemoryStore::default(), FakeFlow::default());

        let err = auth.authenticate(&fx.config).await.unwrap_err();
        assert_eq!(
            err,
            AuthError::MissingClientSecret(fx.config.credential_secret_path.clone())
        );
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flow_failures_are_mapped() {
        let fx = fixture(true);

        let declined = FakeFlow {
            authorize_error: Some(FlowError::UserDeclined),
            ..FakeFlow::default()
        };
        let auth = TokenAuthenticator::new(MemoryStore::default(), declined);
        assert!(matches!(
            auth.authenticate(&fx.config).await,
            Err(AuthError::AuthorizationFailed { ref account, .. }) if account.as_str() == "work"
        ));

        let bad_secret = FakeFlow {
            authorize_error: Some(FlowError::InvalidClientSecret("unknown client".into())),
            ..FakeFlow::default()
        };
        let auth = TokenAuthenticator::new(MemoryStore::default(), bad_secret);
        assert_eq!(
            auth.authenticate(&fx.config).await.unwrap_err(),
            AuthError::InvalidClientSecret("unknown client".into())
        );
    }

    #[tokio::test]
    async fn test_persist_failure_degrades_gracefully() {
        let fx = fixture(true);
        let store = MemoryStore {
            read_only: true,
            ..MemoryStore::default()
        };
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert!(credential.is_valid());
        assert_eq!(auth.store().saves.load(Ordering::SeqCst), 1);
        assert!(auth.store().get(&fx.config.token_state_path).is_none());
    }

    #[tokio::test]
    async fn test_expire_access_forces_refresh() {
        let fx = fixture(true);
        let required = fx.config.required_scopes();
        let store = MemoryStore::with(
            &fx.config.token_state_path,
            &stored("rejected", Duration::hours(1), &required),
        );
        let auth = TokenAuthenticator::new(store, FakeFlow::default());

        auth.expire_access(&fx.config).await;
        let kept = auth.store().get(&fx.config.token_state_path).unwrap();
        assert!(kept.access_token.is_empty());
        assert_eq!(kept.refresh_token.as_deref(), Some("refresh-0"));

        let credential = auth.authenticate(&fx.config).await.unwrap();
        assert_eq!(credential.access_token, "refreshed");
        assert_eq!(auth.flow().refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(auth.flow().authorize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expire_access_without_stored_credential() {
        let fx = fixture(true);
        let auth = TokenAuthenticator::new(MemoryStore::default(), FakeFlow::default());

        auth.expire_access(&fx.config).await;
        assert_eq!(auth.store().saves.load(Ordering::SeqCst), 0);
        assert_eq!(auth.store().discards.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_validate_classification() {
        let required = vec!["a".to_string(), "b".to_string()];
        let good = Credential::new("t").with_scopes(["a", "b"]);
        assert!(matches!(
            TokenAuthenticator::<MemoryStore, FakeFlow>::validate(good, &required),
            AuthState::Validated(_, Validity::Valid)
        ));

        let empty = Credential::new("").with_scopes(["b", "a"]);
        assert!(matches!(
            TokenAuthenticator::<MemoryStore, FakeFlow>::validate(empty, &required),
            AuthState::Validated(_, Validity::Expired)
        ));

        let narrow = Credential::new("t").with_scopes(["a"]);
        let state = TokenAuthenticator::<MemoryStore, FakeFlow>::validate(narrow, &required);
        assert_eq!(state.to_string(), "validated(scope-mismatch)");
    }
}
