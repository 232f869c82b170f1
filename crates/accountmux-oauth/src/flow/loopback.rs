//! One-shot loopback HTTP receiver for the authorization redirect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Pause after a failed `accept` so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Listens on `127.0.0.1` for the browser redirect that carries the authorization code.
#[derive(Debug)]
pub struct LoopbackReceiver {
    listener: TcpListener,
    addr: SocketAddr,
}

impl LoopbackReceiver {
    /// Binds to an ephemeral port on the loopback interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        debug!(%addr, "loopback redirect receiver listening");
        Ok(Self { listener, addr })
    }

    /// Redirect URI to register with the authorization request.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}", self.addr.ip(), self.addr.port())
    }

    /// Waits for the redirect and returns the authorization code.
    ///
    /// Requests that carry neither a code nor an error (favicon requests and the like)
    /// are answered with 404 and ignored. A connection that fails to accept or sends
    /// an unreadable request is logged and skipped. There is no internal timeout; the
    /// caller owns cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateMismatch`] if the redirect's `state` differs from
    /// `expected_state`, [`Error::AccessDenied`] if the user declined consent, and
    /// [`Error::OAuth`] for any other error reported by the authorization server.
    pub async fn wait_for_code(&self, expected_state: &str) -> Result<String> {
        loop {
            let (mut socket, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "failed to accept redirect connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let params = match read_query(&mut socket).await {
                Ok(Some(params)) => params,
                Ok(None) => {
                    respond(&mut socket, "404 Not Found", "Not found").await;
                    continue;
                }
                Err(e) => {
                    warn!(%peer, error = %e, "unreadable redirect request, ignoring");
                    respond(&mut socket, "400 Bad Request", "Bad request").await;
                    continue;
                }
            };

            if let Some(error) = params.get("error") {
                let description = params
                    .get("error_description")
                    .cloned()
                    .unwrap_or_default();
                warn!(%peer, error = %error, "authorization server returned an error");
                respond(&mut socket, "400 Bad Request", "Authorization failed. You can close this tab.").await;
                return Err(if error == "access_denied" {
                    Error::AccessDenied
                } else {
                    Error::oauth_error(error.clone(), description)
                });
            }

            match (params.get("code"), params.get("state")) {
                (Some(code), Some(state)) => {
                    if state != expected_state {
                        respond(&mut socket, "400 Bad Request", "Invalid state parameter.").await;
                        return Err(Error::StateMismatch);
                    }
                    respond(&mut socket, "200 OK", "Authentication complete. You can close this tab.").await;
                    return Ok(code.clone());
                }
                _ => respond(&mut socket, "404 Not Found", "Not found").await,
            }
        }
    }
}

/// Reads the request line and returns its query parameters, if it has any.
async fn read_query<S>(socket: &mut S) -> Result<Option<HashMap<String, String>>>
where
    S: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(socket);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain headers so closing the socket does not reset the connection.
    let mut header = String::new();
    loop {
        header.clear();
        let read = reader.read_line(&mut header).await?;
        if read == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    // "GET /path?query HTTP/1.1"
    let Some(target) = request_line.split_whitespace().nth(1) else {
        return Ok(None);
    };
    let Some((_, query)) = target.split_once('?') else {
        return Ok(None);
    };

    Ok(Some(
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect(),
    ))
}

async fn respond<S>(socket: &mut S, status: &str, message: &str)
where
    S: AsyncWrite + Unpin,
{
    let body = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>accountmux</title></head>\
         <body><p>{message}</p></body></html>"
    );
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        debug!("failed to answer redirect request: {e}");
    }
    let _ = socket.shutdown().await;
}
