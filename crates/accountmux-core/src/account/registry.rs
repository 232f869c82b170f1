//! Durable account registry.
//!
//! The registry is a JSON object keyed by account id, written through on every
//! mutation. A mutation is computed on a copy of the mapping, validated, written
//! atomically (temp file + rename), and only then made visible in memory. If the
//! write fails the in-memory view is left as it was.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::model::{AccountConfig, AccountId, AccountUpdate, ListFilter, ProviderKind};
use super::validation::{ValidationError, validate_account};
use crate::{Error, Result};

/// Durable mapping of account id to [`AccountConfig`], in insertion order.
#[derive(Debug)]
pub struct AccountRegistry {
    path: Option<PathBuf>,
    accounts: RwLock<Vec<AccountConfig>>,
}

impl AccountRegistry {
    /// Open the registry stored at `path`.
    ///
    /// A missing file yields an empty registry; the file is created on the first
    /// mutation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if the document is not a valid registry and
    /// [`Error::Io`] if it cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let accounts = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => parse_document(&path, &raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no registry on disk, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %path.display(),
            accounts = accounts.len(),
            "account registry loaded"
        );

        Ok(Self {
            path: Some(path),
            accounts: RwLock::new(accounts),
        })
    }

    /// Create a registry with no durable store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            accounts: RwLock::new(Vec::new()),
        }
    }

    /// Location of the durable store, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no such account exists.
    pub async fn get(&self, id: &AccountId) -> Result<AccountConfig> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| &a.id == id)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(id.clone()))
    }

    /// List accounts in insertion order.
    pub async fn list(&self, filter: ListFilter) -> Vec<AccountConfig> {
        self.accounts
            .read()
            .await
            .iter()
            .filter(|a| !filter.enabled_only || a.enabled)
            .cloned()
            .collect()
    }

    /// The enabled default account for `kind`, if one is flagged.
    pub async fn default_for(&self, kind: ProviderKind) -> Option<AccountConfig> {
        self.accounts
            .read()
            .await
            .iter()
            .find(|a| a.kind == kind && a.is_default && a.enabled)
            .cloned()
    }

    /// Add a new account.
    ///
    /// If the account is flagged default, every other account of the same kind
    /// loses the flag in the same write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateAccount`], [`Error::InvalidDefault`],
    /// [`Error::Validation`], or [`Error::PersistFailure`] (nothing changed).
    pub async fn add(&self, config: AccountConfig) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        if accounts.iter().any(|a| a.id == config.id) {
            return Err(Error::DuplicateAccount(config.id));
        }
        check(&config)?;

        let mut next = accounts.clone();
        next.push(config.clone());
        if config.is_default {
            clear_other_defaults(&mut next, &config.id, config.kind);
        }

        self.persist(&next).await?;
        *accounts = next;
        info!(account = %config.id, kind = %config.kind, "account added");
        Ok(())
    }

    /// Apply a partial update to an existing account and return the result.
    ///
    /// Disabling the default account clears its default flag. Making an account the
    /// default clears the flag on the previous default of the same kind, in the same
    /// write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`], [`Error::InvalidDefault`],
    /// [`Error::Validation`], or [`Error::PersistFailure`] (nothing changed).
    pub async fn update(&self, id: &AccountId, update: &AccountUpdate) -> Result<AccountConfig> {
        let mut accounts = self.accounts.write().await;
        let index = accounts
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| Error::AccountNotFound(id.clone()))?;

        let mut updated = accounts[index].clone();
        updated.apply(update);
        if !updated.enabled && update.is_default != Some(true) {
            updated.is_default = false;
        }
        check(&updated)?;

        let mut next = accounts.clone();
        next[index] = updated.clone();
        if updated.is_default {
            clear_other_defaults(&mut next, id, updated.kind);
        }

        self.persist(&next).await?;
        *accounts = next;
        info!(account = %id, "account updated");
        Ok(updated)
    }

    /// Make `id` the default account of its kind.
    ///
    /// # Errors
    ///
    /// Same as [`Self::update`].
    pub async fn set_default(&self, id: &AccountId) -> Result<AccountConfig> {
        self.update(id, &AccountUpdate::default_flag(true)).await
    }

    /// Delete an account and return its last configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] or [`Error::PersistFailure`] (nothing changed).
    pub async fn delete(&self, id: &AccountId) -> Result<AccountConfig> {
        let mut accounts = self.accounts.write().await;
        let index = accounts
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| Error::AccountNotFound(id.clone()))?;

        let mut next = accounts.clone();
        let removed = next.remove(index);

        self.persist(&next).await?;
        *accounts = next;
        info!(account = %id, "account deleted");
        Ok(removed)
    }

    /// Write the full mapping to the durable store.
    async fn persist(&self, accounts: &[AccountConfig]) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut document = Map::new();
        for account in accounts {
            document.insert(account.id.to_string(), serde_json::to_value(account)?);
        }
        let payload = serde_json::to_vec_pretty(&Value::Object(document))?;

        write_atomic(path, &payload)
            .await
            .map_err(|source| Error::PersistFailure {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), accounts = accounts.len(), "registry persisted");
        Ok(())
    }
}

/// Distinguishes temp files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write `payload` to a sibling temp file, flush it, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    tmp_name.push(format!(".{}.{seq}.tmp", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(payload).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
}

/// Map validation failures onto registry errors.
fn check(config: &AccountConfig) -> Result<()> {
    match validate_account(config) {
        Ok(()) => Ok(()),
        Err(errors) if errors == [ValidationError::DisabledDefault] => {
            Err(Error::InvalidDefault(config.id.clone()))
        }
        Err(errors) => Err(Error::Validation(errors)),
    }
}

fn clear_other_defaults(accounts: &mut [AccountConfig], keep: &AccountId, kind: ProviderKind) {
    for account in accounts
        .iter_mut()
        .filter(|a| a.kind == kind && a.is_default && &a.id != keep)
    {
        debug!(account = %account.id, "clearing previous default");
        account.is_default = false;
    }
}

fn parse_document(path: &Path, raw: &str) -> Result<Vec<AccountConfig>> {
    let registry_error = |reason: String| Error::Registry {
        path: path.to_path_buf(),
        reason,
    };

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: Map<String, Value> =
        serde_json::from_str(raw).map_err(|e| registry_error(e.to_string()))?;

    let mut accounts = Vec::with_capacity(document.len());
    let mut seen_defaults = HashSet::new();
    for (key, value) in document {
        let mut account: AccountConfig = serde_json::from_value(value)
            .map_err(|e| registry_error(format!("account '{key}': {e}")))?;

        if account.id.as_str() != key {
            if !account.id.as_str().is_empty() {
                warn!(key = %key, name = %account.id, "registry entry name differs from its key, using key");
            }
            account.id = AccountId::new(key);
        }

        if account.is_default && !seen_defaults.insert(account.kind) {
            warn!(account = %account.id, kind = %account.kind, "multiple defaults on disk, clearing");
            account.is_default = false;
        }

        accounts.push(account);
    }

    Ok(accounts)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mail(id: &str) -> AccountConfig {
        AccountConfig::new(
            id,
            ProviderKind::Mail,
            format!("secrets/credentials_{id}.json"),
            format!("secrets/token_{id}.json"),
        )
    }

    fn registry_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("accounts.json")
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let registry = AccountRegistry::in_memory();
        registry.add(mail("work")).await.unwrap();

        let account = registry.get(&"work".into()).await.unwrap();
        assert_eq!(account.kind, ProviderKind::Mail);
        assert!(matches!(
            registry.get(&"nope".into()).await,
            Err(Error::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let registry = AccountRegistry::in_memory();
        registry.add(mail("work")).await.unwrap();
        assert!(matches!(
            registry.add(mail("work")).await,
            Err(Error::DuplicateAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_disabled_default_rejected() {
        let registry = AccountRegistry::in_memory();
        let result = registry
            .add(mail("work").as_default().with_enabled(false))
            .await;
        assert!(matches!(result, Err(Error::InvalidDefault(_))));
        assert!(registry.list(ListFilter::ALL).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_id_rejected() {
        let registry = AccountRegistry::in_memory();
        let result = registry.add(mail("../escape")).await;
        assert!(matches!(result, Err(Error::Validation(e)) if e == vec![ValidationError::InvalidId]));
    }

    #[tokio::test]
    async fn test_list_insertion_order_and_filter() {
        let registry = AccountRegistry::in_memory();
        registry.add(mail("zeta")).await.unwrap();
        registry.add(mail("alpha").with_enabled(false)).await.unwrap();
        registry.add(mail("mid")).await.unwrap();

        let all: Vec<_> = registry
            .list(ListFilter::ALL)
            .await
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(all, ["zeta", "alpha", "mid"]);

        let enabled = registry.list(ListFilter::ENABLED).await;
        assert_eq!(enabled.len(), 2);
    }

    #[tokio::test]
    async fn test_add_default_flips_previous() {
        let registry = AccountRegistry::in_memory();
        registry.add(mail("work").as_default()).await.unwrap();
        registry.add(mail("personal").as_default()).await.unwrap();

        assert!(!registry.get(&"work".into()).await.unwrap().is_default);
        assert_eq!(
            registry.default_for(ProviderKind::Mail).await.unwrap().id.as_str(),
            "personal"
        );
    }

    #[tokio::test]
    async fn test_update_default_flips_previous_durably() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(&dir);
        let registry = AccountRegistry::open(&path).await.unwrap();
        registry.add(mail("work").as_default()).await.unwrap();
        registry.add(mail("personal")).await.unwrap();

        registry
            .update(&"personal".into(), &AccountUpdate::default_flag(true))
            .await
            .unwrap();

        let reopened = AccountRegistry::open(&path).await.unwrap();
        assert!(!reopened.get(&"work".into()).await.unwrap().is_default);
        assert!(reopened.get(&"personal".into()).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_defaults_are_per_kind() {
        let registry = AccountRegistry::in_memory();
        registry.add(mail("work").as_default()).await.unwrap();
        let calendar =
            AccountConfig::new("cal", ProviderKind::Calendar, "c.json", "t.json").as_default();
        registry.add(calendar).await.unwrap();

        assert!(registry.get(&"work".into()).await.unwrap().is_default);
        assert!(registry.get(&"cal".into()).await.unwrap().is_default);
    }

    #[tokio::test]
    async fn test_disabling_default_clears_flag() {
        let registry = AccountRegistry::in_memory();
        registry.add(mail("work").as_default()).await.unwrap();

        let updated = registry
            .update(&"work".into(), &AccountUpdate::enabled(false))
            .await
            .unwrap();
        assert!(!updated.enabled);
        assert!(!updated.is_default);
        assert!(registry.default_for(ProviderKind::Mail).await.is_none());
    }

    #[tokio::test]
    async fn test_update_missing() {
        let registry = AccountRegistry::in_memory();
        let result = registry
            .update(&"ghost".into(), &AccountUpdate::enabled(true))
            .await;
        assert!(matches!(result, Err(Error::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_round_trip_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(&dir);
        let added = mail("work").with_display_name("Work Inbox").as_default();

        {
            let registry = AccountRegistry::open(&path).await.unwrap();
            registry.add(mail("b-first")).await.unwrap();
            registry.add(added.clone()).await.unwrap();
        }

        let reopened = AccountRegistry::open(&path).await.unwrap();
        let listed = reopened.list(ListFilter::ALL).await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id.as_str(), "b-first");
        assert_eq!(listed[1], added);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(&dir);
        let registry = AccountRegistry::open(&path).await.unwrap();
        registry.add(mail("work")).await.unwrap();

        let removed = registry.delete(&"work".into()).await.unwrap();
        assert_eq!(removed.id.as_str(), "work");
        assert!(matches!(
            registry.delete(&"work".into()).await,
            Err(Error::AccountNotFound(_))
        ));

        let reopened = AccountRegistry::open(&path).await.unwrap();
        assert!(reopened.list(ListFilter::ALL).await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("state");
        let path = nested.join("accounts.json");
        let registry = AccountRegistry::open(&path).await.unwrap();
        registry.add(mail("work")).await.unwrap();

        // Replace the registry directory with a plain file so the next write fails.
        std::fs::remove_dir_all(&nested).unwrap();
        std::fs::write(&nested, b"blocker").unwrap();

        let result = registry.add(mail("personal")).await;
        assert!(matches!(result, Err(Error::PersistFailure { .. })));
        let result = registry.delete(&"work".into()).await;
        assert!(matches!(result, Err(Error::PersistFailure { .. })));

        let ids: Vec<_> = registry
            .list(ListFilter::ALL)
            .await
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, ["work"]);
    }

    #[tokio::test]
    async fn test_open_legacy_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(&dir);
        std::fs::write(
            &path,
            r#"{
                "personal": {"name": "personal", "provider": "gmail", "display_name": "",
                             "credential_path": "c1", "token_path": "t1",
                             "enabled": true, "default_account": true},
                "work": {"provider": "gmail", "credential_path": "c2", "token_path": "t2",
                         "default_account": true}
            }"#,
        )
        .unwrap();

        let registry = AccountRegistry::open(&path).await.unwrap();
        let listed = registry.list(ListFilter::ALL).await;
        assert_eq!(listed[0].id.as_str(), "personal");
        assert_eq!(listed[1].id.as_str(), "work");
        assert!(listed[0].is_default);
        assert!(!listed[1].is_default);
    }

    #[tokio::test]
    async fn test_open_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = registry_path(&dir);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AccountRegistry::open(&path).await,
            Err(Error::Registry { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, b"{}").await.unwrap();
        write_atomic(&path, b"{\"a\":1}").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":1}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_write_atomic_to_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let writers = (0..8).map(|n| {
            let path = path.clone();
            let payload = format!("{{\"n\":{n}}}");
            tokio::spawn(async move { write_atomic(&path, payload.as_bytes()).await })
        });
        for joined in futures::future::join_all(writers).await {
            joined.unwrap().unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(written["n"].as_u64().unwrap() < 8);
    }
}
