//! Account validation.

use super::model::AccountConfig;

/// Validation error for account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Account id is empty.
    EmptyId,
    /// Account id contains characters other than ASCII letters, digits, `-` and `_`.
    InvalidId,
    /// Client secret path is empty.
    EmptyCredentialPath,
    /// Token state path is empty.
    EmptyTokenPath,
    /// A disabled account is flagged as default.
    DisabledDefault,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyId => "Account id is required",
            Self::InvalidId => "Account id may only contain letters, digits, '-' and '_'",
            Self::EmptyCredentialPath => "Client secret path is required",
            Self::EmptyTokenPath => "Token path is required",
            Self::DisabledDefault => "A disabled account cannot be the default",
        }
    }

    /// Get the storage field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyId | Self::InvalidId => "name",
            Self::EmptyCredentialPath => "credential_path",
            Self::EmptyTokenPath => "token_path",
            Self::DisabledDefault => "default_account",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an account.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate an account configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_account(account: &AccountConfig) -> ValidationResult {
    let mut errors = Vec::new();

    let id = account.id.as_str();
    if id.trim().is_empty() {
        errors.push(ValidationError::EmptyId);
    } else if !is_valid_id(id) {
        errors.push(ValidationError::InvalidId);
    }

    if account.credential_secret_path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyCredentialPath);
    }
    if account.token_state_path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyTokenPath);
    }

    if account.is_default && !account.enabled {
        errors.push(ValidationError::DisabledDefault);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Ids end up in file names (`token_<id>.json`), so keep them filesystem-safe.
fn is_valid_id(id: &str) -> bool {
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
