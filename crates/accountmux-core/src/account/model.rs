//! Account model types.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Gmail read access.
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
/// Gmail send access.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
/// Full calendar access.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
/// Full drive access.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Unique, immutable identifier of a logical account (e.g. `work`, `personal`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Provider capability an account is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Mail provider (Gmail).
    #[serde(alias = "gmail")]
    Mail,
    /// Calendar provider.
    #[serde(alias = "google_calendar")]
    Calendar,
    /// File storage provider (Drive).
    #[serde(alias = "drive")]
    Storage,
}

impl ProviderKind {
    /// All provider kinds.
    pub const ALL: [Self; 3] = [Self::Mail, Self::Calendar, Self::Storage];

    /// Stable lowercase name used on disk and on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Calendar => "calendar",
            Self::Storage => "storage",
        }
    }

    /// Get display name for the provider kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Mail => "Mail",
            Self::Calendar => "Calendar",
            Self::Storage => "Storage",
        }
    }

    /// Scopes an account of this kind must hold.
    #[must_use]
    pub fn required_scopes(&self) -> Vec<String> {
        let scopes: &[&str] = match self {
            Self::Mail => &[GMAIL_READONLY_SCOPE, GMAIL_SEND_SCOPE],
            Self::Calendar => &[CALENDAR_SCOPE],
            Self::Storage => &[DRIVE_SCOPE],
        };
        scopes.iter().map(|s| (*s).to_string()).collect()
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mail" | "gmail" => Ok(Self::Mail),
            "calendar" | "google_calendar" => Ok(Self::Calendar),
            "storage" | "drive" => Ok(Self::Storage),
            other => Err(format!(
                "unknown provider '{other}' (expected mail, calendar or storage)"
            )),
        }
    }
}

/// Configuration of one logical account.
///
/// Persisted with the field names `name, provider, display_name, credential_path,
/// token_path, enabled, default_account`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Unique identifier.
    #[serde(rename = "name", default)]
    pub id: AccountId,
    /// Provider this account authenticates against.
    #[serde(rename = "provider")]
    pub kind: ProviderKind,
    /// Display name for the account.
    #[serde(default)]
    pub display_name: String,
    /// Location of the OAuth client secret document.
    #[serde(rename = "credential_path")]
    pub credential_secret_path: PathBuf,
    /// Location of the persisted credential.
    #[serde(rename = "token_path")]
    pub token_state_path: PathBuf,
    /// Whether this account may be resolved.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whether this is the default account for its provider kind.
    #[serde(rename = "default_account", default)]
    pub is_default: bool,
}

const fn default_enabled() -> bool {
    true
}

impl AccountConfig {
    /// Create an enabled, non-default account with a generated display name.
    #[must_use]
    pub fn new(
        id: impl Into<AccountId>,
        kind: ProviderKind,
        credential_secret_path: impl Into<PathBuf>,
        token_state_path: impl Into<PathBuf>,
    ) -> Self {
        let id = id.into();
        let display_name = generated_display_name(&id, kind);
        Self {
            id,
            kind,
            display_name,
            credential_secret_path: credential_secret_path.into(),
            token_state_path: token_state_path.into(),
            enabled: true,
            is_default: false,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Mark as the default account for its kind.
    #[must_use]
    pub const fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Scopes this account must hold.
    #[must_use]
    pub fn required_scopes(&self) -> Vec<String> {
        self.kind.required_scopes()
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &AccountUpdate) {
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(name) = &update.display_name {
            self.display_name.clone_from(name);
        }
        if let Some(path) = &update.credential_secret_path {
            self.credential_secret_path.clone_from(path);
        }
        if let Some(path) = &update.token_state_path {
            self.token_state_path.clone_from(path);
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(is_default) = update.is_default {
            self.is_default = is_default;
        }
    }
}

/// `"work"` + mail → `"Work Mail Account"`.
fn generated_display_name(id: &AccountId, kind: ProviderKind) -> String {
    let mut chars = id.as_str().chars();
    let title = chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    });
    format!("{title} {} Account", kind.display_name())
}

/// Partial set of fields for [`AccountConfig`] updates. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountUpdate {
    /// New provider kind.
    pub kind: Option<ProviderKind>,
    /// New display name.
    pub display_name: Option<String>,
    /// New client secret location.
    pub credential_secret_path: Option<PathBuf>,
    /// New credential location.
    pub token_state_path: Option<PathBuf>,
    /// New enabled flag.
    pub enabled: Option<bool>,
    /// New default flag.
    pub is_default: Option<bool>,
}

impl AccountUpdate {
    /// Update that only sets the default flag.
    #[must_use]
    pub fn default_flag(is_default: bool) -> Self {
        Self {
            is_default: Some(is_default),
            ..Self::default()
        }
    }

    /// Update that only sets the enabled flag.
    #[must_use]
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Returns true if applying this update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Filter for [`crate::AccountRegistry::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only return enabled accounts.
    pub enabled_only: bool,
}

impl ListFilter {
    /// Every account.
    pub const ALL: Self = Self {
        enabled_only: false,
    };

    /// Enabled accounts only.
    pub const ENABLED: Self = Self { enabled_only: true };
}
