//! # accountmux-oauth
//!
//! `OAuth2` building blocks for installed (desktop/CLI) applications that talk to
//! Google-style APIs.
//!
//! ## Features
//!
//! - **Credentials**: access/refresh token bundle with granted scopes and expiry
//! - **Client secrets**: parsing of provider-issued `installed`/`web` secret files
//! - **Authorization Code Flow**: consent URL with PKCE and CSRF state
//! - **Loopback redirect**: one-shot local HTTP receiver for the authorization code
//! - **Token endpoint**: code exchange and refresh over HTTP
//!
//! ## Quick Start
//!
//! ```ignore
//! use accountmux_oauth::{AuthorizationCodeFlow, ClientSecret, LoopbackReceiver};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let secret = ClientSecret::from_file("credentials.json")?;
//!     let receiver = LoopbackReceiver::bind().await?;
//!     let client = secret.client()?.with_redirect_uri(receiver.redirect_uri());
//!
//!     let scopes = vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()];
//!     let flow = AuthorizationCodeFlow::new(client).with_pkce();
//!     let state = accountmux_oauth::flow::generate_state();
//!     let url = flow.authorization_url(&scopes, &state)?;
//!     println!("Visit: {url}");
//!
//!     let code = receiver.wait_for_code(&state).await?;
//!     let credential = flow.exchange_code(&code, &scopes).await?;
//!     println!("Granted: {:?}", credential.scopes);
//!     Ok(())
//! }
//! ```
//!
//! ### Token Refresh
//!
//! ```ignore
//! if credential.is_expired() {
//!     let fresh = client.refresh(&credential).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
pub mod flow;
pub mod provider;
pub mod secret;
pub mod token;

pub use error::{Error, Result};
pub use flow::{AuthorizationCodeFlow, LoopbackReceiver, OAuthClient, PkceChallenge};
pub use provider::Provider;
pub use secret::ClientSecret;
pub use token::Credential;
