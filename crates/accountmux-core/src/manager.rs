//! Account manager: registry + authenticator + live client cache.
//!
//! `resolve` is single-flight per account. The first caller without a cached client
//! spawns one authentication task; everyone else awaits the same shared result. The
//! task runs to completion even if every caller goes away, and a failure is handed
//! to all waiters but never cached.
//!
//! Each account has a generation counter. `invalidate` bumps it, so an attempt that
//! started before the invalidation still answers its own waiters but does not put
//! its client in the cache. The stale attempt stays registered until it finishes;
//! a `resolve` that finds it waits for it before starting a fresh one, so at most
//! one authentication per account runs at a time.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{
    AccountConfig, AccountId, AccountRegistry, AccountUpdate, ListFilter, ProviderKind,
};
use crate::auth::{AuthError, AuthorizationFlow, BrowserAuthorizationFlow, TokenAuthenticator};
use crate::client::{ProviderClient, ProviderError};
use crate::config::Settings;
use crate::credential::{CredentialStore, DynCredentialStore, credential_store};
use crate::{Error, Result};

type Attempt = Shared<BoxFuture<'static, std::result::Result<Arc<ProviderClient>, AuthError>>>;

/// An authentication attempt and the generation it was started under.
struct InFlight {
    generation: u64,
    attempt: Attempt,
}

#[derive(Default)]
struct Slots {
    clients: HashMap<AccountId, Arc<ProviderClient>>,
    in_flight: HashMap<AccountId, InFlight>,
    generations: HashMap<AccountId, u64>,
}

impl Slots {
    fn generation(&self, id: &AccountId) -> u64 {
        self.generations.get(id).copied().unwrap_or_default()
    }

    /// Drop the cached client for `id` and mark any in-flight attempt as stale.
    fn invalidate(&mut self, id: &AccountId) -> bool {
        *self.generations.entry(id.clone()).or_default() += 1;
        self.clients.remove(id).is_some()
    }
}

struct Inner<S, F> {
    registry: AccountRegistry,
    authenticator: TokenAuthenticator<S, F>,
    settings: Settings,
    slots: Mutex<Slots>,
}

/// Cache state of one account, as reported by [`AccountManager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountStatus {
    /// Registry entry.
    pub config: AccountConfig,
    /// A live client is cached.
    pub cached: bool,
    /// An authentication attempt is running.
    pub authenticating: bool,
}

/// Failure of [`AccountManager::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// The account could not be resolved to a client.
    #[error(transparent)]
    Resolve(#[from] Error),

    /// The provider operation failed.
    #[error("{0}")]
    Provider(ProviderError<E>),
}

/// Single entry point for resolving accounts to live provider clients.
///
/// Cheap to clone; clones share the registry and the cache.
pub struct AccountManager<S = DynCredentialStore, F = BrowserAuthorizationFlow> {
    inner: Arc<Inner<S, F>>,
}

impl<S, F> Clone for AccountManager<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, F> std::fmt::Debug for AccountManager<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("registry", &self.inner.registry)
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl AccountManager {
    /// Open the registry named by `settings` and use the configured credential
    /// backend with browser authorization.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be loaded.
    pub async fn open(settings: Settings) -> Result<Self> {
        let registry = AccountRegistry::open(&settings.registry_path).await?;
        debug!(backend = %settings.credential_backend, "credential backend selected");
        let store = credential_store(settings.credential_backend);
        let authenticator = TokenAuthenticator::new(store, BrowserAuthorizationFlow::new());
        Ok(Self::new(registry, authenticator, settings))
    }
}

impl<S, F> AccountManager<S, F>
where
    S: CredentialStore + 'static,
    F: AuthorizationFlow + 'static,
{
    /// Create a manager over an opened registry.
    pub fn new(
        registry: AccountRegistry,
        authenticator: TokenAuthenticator<S, F>,
        settings: Settings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                authenticator,
                settings,
                slots: Mutex::new(Slots::default()),
            }),
        }
    }

    /// The account registry.
    pub fn registry(&self) -> &AccountRegistry {
        &self.inner.registry
    }

    /// The authenticator.
    pub fn authenticator(&self) -> &TokenAuthenticator<S, F> {
        &self.inner.authenticator
    }

    /// Settings the manager was created with.
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Get the live client for `id`, authenticating on first use.
    ///
    /// A cached client is returned without re-validation.
    ///
    /// # Errors
    ///
    /// [`Error::NotConfigured`] if the account is unknown or disabled, or the
    /// authentication failure.
    pub async fn resolve(&self, id: &AccountId) -> Result<Arc<ProviderClient>> {
        let attempt = loop {
            let stale = {
                let mut slots = self.inner.slots.lock().await;
                if let Some(client) = slots.clients.get(id) {
                    debug!(account = %id, "client cache hit");
                    return Ok(Arc::clone(client));
                }

                let generation = slots.generation(id);
                let running = slots
                    .in_flight
                    .get(id)
                    .map(|f| (f.generation == generation, f.attempt.clone()));
                match running {
                    Some((true, attempt)) => {
                        debug!(account = %id, "joining in-flight authentication");
                        break attempt;
                    }
                    Some((false, attempt)) => attempt,
                    None => {
                        let config = match self.inner.registry.get(id).await {
                            Ok(config) if config.enabled => config,
                            Ok(_) | Err(Error::AccountNotFound(_)) => {
                                return Err(Error::NotConfigured(id.clone()));
                            }
                            Err(e) => return Err(e),
                        };

                        let attempt = self.spawn_attempt(config, generation);
                        slots.in_flight.insert(
                            id.clone(),
                            InFlight {
                                generation,
                                attempt: attempt.clone(),
                            },
                        );
                        break attempt;
                    }
                }
            };

            // Its outcome belongs to the callers that started it.
            debug!(account = %id, "waiting for stale authentication to finish");
            let _ = stale.await;
        };

        Ok(attempt.await?)
    }

    fn spawn_attempt(&self, config: AccountConfig, generation: u64) -> Attempt {
        let inner = Arc::clone(&self.inner);
        let id = config.id.clone();
        debug!(account = %id, generation, "starting authentication");

        let task = tokio::spawn(async move {
            let result = inner
                .authenticator
                .authenticate(&config)
                .await
                .map(|credential| Arc::new(ProviderClient::build(&config, credential)));

            let mut slots = inner.slots.lock().await;
            if slots
                .in_flight
                .get(&config.id)
                .is_some_and(|f| f.generation == generation)
            {
                slots.in_flight.remove(&config.id);
            }

            match &result {
                Ok(client) if slots.generation(&config.id) == generation => {
                    slots.clients.insert(config.id.clone(), Arc::clone(client));
                    info!(account = %config.id, kind = %config.kind, "client ready");
                }
                Ok(_) => debug!(account = %config.id, "account invalidated during authentication, not caching"),
                Err(e) => warn!(account = %config.id, error = %e, "authentication failed"),
            }
            result
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(AuthError::failed(
                    &id,
                    format!("authentication task ended abnormally: {e}"),
                ))
            })
        }
        .boxed()
        .shared()
    }

    /// Resolve the default account of `kind`.
    ///
    /// Uses the registry default, then [`Settings::default_account`] if it names an
    /// enabled account of that kind.
    ///
    /// # Errors
    ///
    /// [`Error::NoDefaultConfigured`] if neither exists, otherwise as [`Self::resolve`].
    pub async fn resolve_default(&self, kind: ProviderKind) -> Result<Arc<ProviderClient>> {
        let config = match self.inner.registry.default_for(kind).await {
            Some(config) => config,
            None => self
                .fallback_default(kind)
                .await
                .ok_or(Error::NoDefaultConfigured(kind))?,
        };
        self.resolve(&config.id).await
    }

    async fn fallback_default(&self, kind: ProviderKind) -> Option<AccountConfig> {
        let id = self.inner.settings.default_account.as_ref()?;
        let config = self.inner.registry.get(id).await.ok()?;
        if config.enabled && config.kind == kind {
            debug!(account = %id, kind = %kind, "using configured fallback default");
            Some(config)
        } else {
            None
        }
    }

    /// Drop the cached client for `id` so the next `resolve` re-authenticates.
    ///
    /// Returns true if a client was cached.
    pub async fn invalidate(&self, id: &AccountId) -> bool {
        let dropped = self.inner.slots.lock().await.invalidate(id);
        if dropped {
            info!(account = %id, "cached client invalidated");
        }
        dropped
    }

    /// Run `op` against the client for `id`, re-authenticating and retrying once if
    /// the provider reports the credential as expired.
    ///
    /// Before the retry the stored access token is marked unusable, so the retry
    /// runs with a refreshed or newly authorized credential.
    ///
    /// # Errors
    ///
    /// The resolve failure, or the provider error of the last attempt.
    pub async fn execute<T, E, Op, Fut>(
        &self,
        id: &AccountId,
        op: Op,
    ) -> std::result::Result<T, ExecuteError<E>>
    where
        Op: Fn(Arc<ProviderClient>) -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError<E>>>,
    {
        let client = self.resolve(id).await?;
        match op(client).await {
            Err(ProviderError::AuthExpired) => {
                info!(account = %id, "provider reported expired credential, retrying once");
                if let Ok(config) = self.inner.registry.get(id).await {
                    self.inner.authenticator.expire_access(&config).await;
                }
                self.invalidate(id).await;
                let client = self.resolve(id).await?;
                op(client).await.map_err(ExecuteError::Provider)
            }
            other => other.map_err(ExecuteError::Provider),
        }
    }

    /// Add an account to the registry.
    ///
    /// # Errors
    ///
    /// See [`AccountRegistry::add`].
    pub async fn add_account(&self, config: AccountConfig) -> Result<()> {
        let id = config.id.clone();
        self.inner.registry.add(config).await?;
        self.invalidate(&id).await;
        Ok(())
    }

    /// Update an account and drop its cached client.
    ///
    /// # Errors
    ///
    /// See [`AccountRegistry::update`].
    pub async fn update_account(
        &self,
        id: &AccountId,
        update: &AccountUpdate,
    ) -> Result<AccountConfig> {
        let updated = self.inner.registry.update(id, update).await?;
        self.invalidate(id).await;
        Ok(updated)
    }

    /// Remove an account and drop its cached client.
    ///
    /// # Errors
    ///
    /// See [`AccountRegistry::delete`].
    pub async fn remove_account(&self, id: &AccountId) -> Result<AccountConfig> {
        let removed = self.inner.registry.delete(id).await?;
        self.invalidate(id).await;
        Ok(removed)
    }

    /// Make `id` the default of its kind.
    ///
    /// # Errors
    ///
    /// See [`AccountRegistry::set_default`].
    pub async fn set_default(&self, id: &AccountId) -> Result<AccountConfig> {
        self.inner.registry.set_default(id).await
    }

    /// List registry entries.
    pub async fn list_accounts(&self, filter: ListFilter) -> Vec<AccountConfig> {
        self.inner.registry.list(filter).await
    }

    /// Every account with its cache state.
    pub async fn status(&self) -> Vec<AccountStatus> {
        let accounts = self.inner.registry.list(ListFilter::ALL).await;
        let slots = self.inner.slots.lock().await;
        accounts
            .into_iter()
            .map(|config| AccountStatus {
                cached: slots.clients.contains_key(&config.id),
                authenticating: slots.in_flight.contains_key(&config.id),
                config,
            })
            .collect()
    }

    /// Drop every cached client.
    pub async fn reset(&self) {
        let mut slots = self.inner.slots.lock().await;
        let ids: Vec<AccountId> = slots
            .clients
            .keys()
            .chain(slots.in_flight.keys())
            .cloned()
            .collect();
        for id in &ids {
            slots.invalidate(id);
        }
        info!(accounts = ids.len(), "session reset");
    }

    /// Discard the stored credential of `id` and drop its cached client.
    ///
    /// # Errors
    ///
    /// [`Error::AccountNotFound`] or a store failure.
    pub async fn forget_credentials(&self, id: &AccountId) -> Result<()> {
        let config = self.inner.registry.get(id).await?;
        self.invalidate(id).await;
        self.inner.authenticator.forget(&config).await
    }

    /// Wait for running authentication attempts, then drop every cached client.
    pub async fn shutdown(&self) {
        let pending: Vec<Attempt> = {
            let slots = self.inner.slots.lock().await;
            slots.in_flight.values().map(|f| f.attempt.clone()).collect()
        };
        if !pending.is_empty() {
            debug!(attempts = pending.len(), "waiting for in-flight authentication");
            join_all(pending).await;
        }

        let mut slots = self.inner.slots.lock().await;
        slots.clients.clear();
        info!("account manager shut down");
    }
}
