//! Authenticated provider sessions.
//!
//! A [`ProviderClient`] is built once per account from the credential produced by
//! the authenticator. Provider operations themselves live with the callers; this
//! module only hands out authorized request builders and recognizes the "auth
//! expired" signal coming back from the provider.

use std::fmt;
use std::ops::Deref;

use accountmux_oauth::Credential;
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use crate::account::{AccountConfig, AccountId, ProviderKind};

/// Gmail REST API root.
pub const MAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/";
/// Calendar REST API root.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
/// Drive REST API root.
pub const STORAGE_API_BASE: &str = "https://www.googleapis.com/drive/v3/";

/// One authenticated session: an account, its credential and an API root.
///
/// The credential is never mutated; a session with an expired token is replaced,
/// not repaired.
#[derive(Clone)]
pub struct Session {
    account: AccountId,
    credential: Credential,
    base_url: &'static str,
    http: reqwest::Client,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.account)
            .field("base_url", &self.base_url)
            .field("expiry", &self.credential.expiry)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn new(account: AccountId, credential: Credential, base_url: &'static str) -> Self {
        Self {
            account,
            credential,
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Account this session belongs to.
    #[must_use]
    pub const fn account(&self) -> &AccountId {
        &self.account
    }

    /// The credential the session was built from.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// API root requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        self.base_url
    }

    /// Attach the bearer token to a request.
    #[must_use]
    pub fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.credential.access_token)
    }

    /// Start an authorized request to `path` under the API root.
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path.trim_start_matches('/'));
        self.authorize(self.http.request(method, url))
    }
}

macro_rules! session_client {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            session: Session,
        }

        impl Deref for $name {
            type Target = Session;

            fn deref(&self) -> &Session {
                &self.session
            }
        }
    };
}

session_client!(
    /// Mail provider session.
    MailClient
);
session_client!(
    /// Calendar provider session.
    CalendarClient
);
session_client!(
    /// File storage provider session.
    StorageClient
);

/// Live client for one account, one variant per [`ProviderKind`].
#[derive(Debug, Clone)]
pub enum ProviderClient {
    /// Mail session.
    Mail(MailClient),
    /// Calendar session.
    Calendar(CalendarClient),
    /// Storage session.
    Storage(StorageClient),
}

/// Construction entry for one provider kind.
struct Factory {
    base_url: &'static str,
    wrap: fn(Session) -> ProviderClient,
}

fn factory(kind: ProviderKind) -> Factory {
    match kind {
        ProviderKind::Mail => Factory {
            base_url: MAIL_API_BASE,
            wrap: |session| ProviderClient::Mail(MailClient { session }),
        },
        ProviderKind::Calendar => Factory {
            base_url: CALENDAR_API_BASE,
            wrap: |session| ProviderClient::Calendar(CalendarClient { session }),
        },
        ProviderKind::Storage => Factory {
            base_url: STORAGE_API_BASE,
            wrap: |session| ProviderClient::Storage(StorageClient { session }),
        },
    }
}

impl ProviderClient {
    /// Build the client variant matching `config.kind`.
    #[must_use]
    pub fn build(config: &AccountConfig, credential: Credential) -> Self {
        let Factory { base_url, wrap } = factory(config.kind);
        wrap(Session::new(config.id.clone(), credential, base_url))
    }

    /// Provider kind of this client.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Mail(_) => ProviderKind::Mail,
            Self::Calendar(_) => ProviderKind::Calendar,
            Self::Storage(_) => ProviderKind::Storage,
        }
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &Session {
        match self {
            Self::Mail(c) => &c.session,
            Self::Calendar(c) => &c.session,
            Self::Storage(c) => &c.session,
        }
    }

    /// Account this client belongs to.
    #[must_use]
    pub fn account(&self) -> &AccountId {
        self.session().account()
    }

    /// Credential the client was built from.
    #[must_use]
    pub fn credential(&self) -> &Credential {
        self.session().credential()
    }

    /// The mail session, if this is a mail client.
    #[must_use]
    pub const fn as_mail(&self) -> Option<&MailClient> {
        match self {
            Self::Mail(c) => Some(c),
            _ => None,
        }
    }

    /// The calendar session, if this is a calendar client.
    #[must_use]
    pub const fn as_calendar(&self) -> Option<&CalendarClient> {
        match self {
            Self::Calendar(c) => Some(c),
            _ => None,
        }
    }

    /// The storage session, if this is a storage client.
    #[must_use]
    pub const fn as_storage(&self) -> Option<&StorageClient> {
        match self {
            Self::Storage(c) => Some(c),
            _ => None,
        }
    }
}

/// Error from a provider operation.
///
/// Only [`ProviderError::AuthExpired`] is interpreted; everything else passes
/// through unchanged.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError<E> {
    /// The provider no longer accepts the session's credential.
    #[error("provider rejected the credential")]
    AuthExpired,

    /// Any other provider failure.
    #[error("{0}")]
    Other(E),
}

impl<E> ProviderError<E> {
    /// Classify a failed response by status: 401 is `AuthExpired`, anything else
    /// is wrapped as `Other(error)`.
    pub fn from_status(status: StatusCode, error: E) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            Self::AuthExpired
        } else {
            Self::Other(error)
        }
    }

    /// Returns true for the auth-expired signal.
    #[must_use]
    pub const fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

impl ProviderError<reqwest::Error> {
    /// Pass a successful response through and classify an unsuccessful one.
    ///
    /// # Errors
    ///
    /// `AuthExpired` on 401, `Other` for any other error status.
    pub fn check(response: Response) -> Result<Response, Self> {
        let status = response.status();
        response
            .error_for_status()
            .map_err(|e| Self::from_status(status, e))
    }
}

impl From<reqwest::Error> for ProviderError<reqwest::Error> {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::from_status(status, e),
            None => Self::Other(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(kind: ProviderKind) -> AccountConfig {
        AccountConfig::new("work", kind, "c.json", "t.json")
    }

    #[test]
    fn test_build_matches_kind() {
        for kind in ProviderKind::ALL {
            let client = ProviderClient::build(&config(kind), Credential::new("tok"));
            assert_eq!(client.kind(), kind);
            assert_eq!(client.account().as_str(), "work");
            assert_eq!(client.credential().access_token, "tok");
        }
    }

    #[test]
    fn test_variant_accessors() {
        let client = ProviderClient::build(&config(ProviderKind::Calendar), Credential::new("t"));
        assert!(client.as_calendar().is_some());
        assert!(client.as_mail().is_none());
        assert!(client.as_storage().is_none());
        assert_eq!(client.session().base_url(), CALENDAR_API_BASE);
    }

    #[test]
    fn test_request_is_authorized() {
        let client = ProviderClient::build(&config(ProviderKind::Mail), Credential::new("secret"));
        let request = client
            .session()
            .request(Method::GET, "/users/me/profile")
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://gmail.googleapis.com/gmail/v1/users/me/profile"
        );
        assert_eq!(
            request.headers()[reqwest::header::AUTHORIZATION],
            "Bearer secret"
        );
    }

    #[test]
    fn test_from_status() {
        let expired: ProviderError<&str> = ProviderError::from_status(StatusCode::UNAUTHORIZED, "x");
        assert!(expired.is_auth_expired());

        let quota: ProviderError<&str> =
            ProviderError::from_status(StatusCode::TOO_MANY_REQUESTS, "quota");
        assert!(matches!(quota, ProviderError::Other("quota")));
        assert_eq!(quota.to_string(), "quota");
    }

    #[test]
    fn test_debug_hides_token() {
        let client = ProviderClient::build(&config(ProviderKind::Storage), Credential::new("hidden"));
        assert!(!format!("{client:?}").contains("hidden"));
    }
}
