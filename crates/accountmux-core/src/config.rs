//! Runtime settings.
//!
//! Read once at startup and handed to [`crate::AccountManager`] by value.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::account::AccountId;
use crate::{Error, Result};

/// Overrides the configuration directory.
pub const CONFIG_DIR_VAR: &str = "ACCOUNTMUX_CONFIG_DIR";
/// Overrides the registry document location.
pub const REGISTRY_VAR: &str = "ACCOUNTMUX_REGISTRY";
/// Overrides where staged client secrets and token files live.
pub const SECRETS_DIR_VAR: &str = "ACCOUNTMUX_SECRETS_DIR";
/// Account used by `resolve_default` when the registry has no default of a kind.
pub const DEFAULT_ACCOUNT_VAR: &str = "ACCOUNTMUX_DEFAULT_ACCOUNT";
/// Log filter used when `RUST_LOG` is unset.
pub const LOG_VAR: &str = "ACCOUNTMUX_LOG";
/// Where credentials are kept: `file` or `keyring`.
pub const CREDENTIAL_BACKEND_VAR: &str = "ACCOUNTMUX_CREDENTIAL_BACKEND";

const APP_DIR: &str = "accountmux";

/// Storage backend for persisted credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialBackend {
    /// One JSON file per account under the secrets directory.
    #[default]
    File,
    /// The platform keyring, keyed by the token-state path.
    Keyring,
}

impl CredentialBackend {
    /// Setting value for this backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Keyring => "keyring",
        }
    }
}

impl fmt::Display for CredentialBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for CredentialBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            _ => Err(Error::InvalidSetting {
                name: CREDENTIAL_BACKEND_VAR,
                value: s.to_string(),
            }),
        }
    }
}

/// Process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base configuration directory.
    pub config_dir: PathBuf,
    /// Account registry document.
    pub registry_path: PathBuf,
    /// Directory for staged client secrets and token state.
    pub secrets_dir: PathBuf,
    /// Fallback default account id.
    pub default_account: Option<AccountId>,
    /// Log filter directive (e.g. `info`, `accountmux_core=debug`).
    pub log_level: String,
    /// Where credentials are persisted.
    pub credential_backend: CredentialBackend,
}

impl Settings {
    /// Settings rooted at `config_dir` with no fallback default account.
    #[must_use]
    pub fn in_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            registry_path: config_dir.join("accounts.json"),
            secrets_dir: config_dir.join("credentials"),
            config_dir,
            default_account: None,
            log_level: "info".to_string(),
            credential_backend: CredentialBackend::File,
        }
    }

    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidSetting`] if a variable holds an unrecognized value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; empty values count as unset.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config_dir = var(CONFIG_DIR_VAR).map_or_else(
            || {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(APP_DIR)
            },
            PathBuf::from,
        );

        let mut settings = Self::in_dir(config_dir);
        if let Some(path) = var(REGISTRY_VAR) {
            settings.registry_path = PathBuf::from(path);
        }
        if let Some(dir) = var(SECRETS_DIR_VAR) {
            settings.secrets_dir = PathBuf::from(dir);
        }
        settings.default_account = var(DEFAULT_ACCOUNT_VAR).map(AccountId::new);
        if let Some(level) = var(LOG_VAR) {
            settings.log_level = level;
        }
        if let Some(backend) = var(CREDENTIAL_BACKEND_VAR) {
            settings.credential_backend = backend.parse()?;
        }
        Ok(settings)
    }

    /// Where `add` stages the client secret of account `id`.
    #[must_use]
    pub fn secret_path_for(&self, id: &AccountId) -> PathBuf {
        self.secrets_dir.join(format!("credentials_{id}.json"))
    }

    /// Where the credential of account `id` is persisted.
    #[must_use]
    pub fn token_path_for(&self, id: &AccountId) -> PathBuf {
        self.secrets_dir.join(format!("token_{id}.json"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_under_config_dir() {
        let settings = Settings::from_lookup(lookup(&[(CONFIG_DIR_VAR, "/etc/amux")])).unwrap();
        assert_eq!(settings.config_dir, PathBuf::from("/etc/amux"));
        assert_eq!(settings.registry_path, PathBuf::from("/etc/amux/accounts.json"));
        assert_eq!(settings.secrets_dir, PathBuf::from("/etc/amux/credentials"));
        assert_eq!(settings.default_account, None);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.credential_backend, CredentialBackend::File);
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (CONFIG_DIR_VAR, "/cfg"),
            (REGISTRY_VAR, "/data/reg.json"),
            (DEFAULT_ACCOUNT_VAR, "work"),
            (LOG_VAR, "debug"),
            (CREDENTIAL_BACKEND_VAR, "Keyring"),
        ]))
        .unwrap();
        assert_eq!(settings.registry_path, PathBuf::from("/data/reg.json"));
        assert_eq!(settings.default_account, Some(AccountId::new("work")));
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.credential_backend, CredentialBackend::Keyring);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = Settings::from_lookup(lookup(&[
            (CONFIG_DIR_VAR, "/cfg"),
            (CREDENTIAL_BACKEND_VAR, "vault"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidSetting { name: CREDENTIAL_BACKEND_VAR, ref value } if value == "vault"
        ));
    }

    #[test]
    fn test_blank_values_ignored() {
        let settings = Settings::from_lookup(lookup(&[
            (CONFIG_DIR_VAR, "/cfg"),
            (DEFAULT_ACCOUNT_VAR, "  "),
            (CREDENTIAL_BACKEND_VAR, ""),
        ]))
        .unwrap();
        assert_eq!(settings.default_account, None);
        assert_eq!(settings.credential_backend, CredentialBackend::File);
    }

    #[test]
    fn test_staged_paths() {
        let settings = Settings::in_dir("/cfg");
        let id = AccountId::new("work");
        assert_eq!(
            settings.secret_path_for(&id),
            PathBuf::from("/cfg/credentials/credentials_work.json")
        );
        assert_eq!(
            settings.token_path_for(&id),
            PathBuf::from("/cfg/credentials/token_work.json")
        );
    }
}
