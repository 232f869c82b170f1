//! Account management module.
//!
//! Provides account configuration, the durable registry, and validation.

mod model;
mod registry;
mod validation;

pub(crate) use registry::write_atomic;

pub use model::{
    AccountConfig, AccountId, AccountUpdate, CALENDAR_SCOPE, DRIVE_SCOPE, GMAIL_READONLY_SCOPE,
    GMAIL_SEND_SCOPE, ListFilter, ProviderKind,
};
pub use registry::AccountRegistry;
pub use validation::{ValidationError, ValidationResult, validate_account};
