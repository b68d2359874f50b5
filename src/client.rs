//! Public client facade (§6). Grounded on the base crate's `client.rs`
//! (`Client::get` building pseudo-headers and delegating to a connection),
//! generalized from "one TLS connection per call" to a small pool of
//! persistent HTTP/2 sessions keyed by `(host, port)` -- HTTP/2's whole
//! point is multiplexing many requests over one connection, so a `Client`
//! reused across calls should reuse the session too.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use crate::runtime::with_deadline;
use crate::session::{run_client_connection, SessionHandle};
use crate::types::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_TOTAL_TIMEOUT_MS};
use log::trace;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout_ms: u64,
    pub total_timeout_ms: u64,
    /// §4.1: reject frames with the stream-id reserved bit set instead of
    /// silently masking it. Off by default, matching the engine's general
    /// "be liberal in what you accept" posture.
    pub strict_framing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            total_timeout_ms: DEFAULT_TOTAL_TIMEOUT_MS,
            strict_framing: false,
        }
    }
}

/// One HTTP/2 session per `(host, port)` the client has talked to, kept
/// alive for the lifetime of the `Client` (§6 "persistent, not one-shot").
pub struct Client {
    config: ClientConfig,
    sessions: Mutex<HashMap<(String, u16), SessionHandle>>,
}

impl Client {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// §6 `get`: builds a `Request` and awaits its `Response`.
    pub async fn get(&self, url: Url) -> Result<Response> {
        self.perform(Request::get(url)).await
    }

    /// §6 `post`.
    pub async fn post(&self, url: Url, body: impl Into<bytes::Bytes>) -> Result<Response> {
        self.perform(Request::post(url, body)).await
    }

    /// §4.5 client `perform`: reuses an existing session for the request's
    /// authority, or establishes a new one under the configured connect
    /// timeout.
    pub async fn perform(&self, request: Request) -> Result<Response> {
        let key = authority_key(&request.url)?;
        let handle = self.session_for(key).await?;
        trace!("perform {} {}", request.method(), request.path());
        with_deadline(self.config.total_timeout_ms, handle.perform(request)).await?
    }

    async fn session_for(&self, key: (String, u16)) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(&key) {
            return Ok(handle.clone());
        }
        let stream = with_deadline(
            self.config.connect_timeout_ms,
            TcpStream::connect((key.0.as_str(), key.1)),
        )
        .await??;
        let handle = run_client_connection(stream, self.config.strict_framing).await?;
        sessions.insert(key, handle.clone());
        Ok(handle)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

fn authority_key(url: &Url) -> Result<(String, u16)> {
    let host = url
        .host_str()
        .ok_or(Error::MalformedFrame("request URL has no host"))?
        .to_owned();
    let port = url
        .port_or_known_default()
        .ok_or(Error::MalformedFrame("request URL has no resolvable port"))?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_key_uses_scheme_default_port() {
        let url = Url::parse("http://example.test/widgets").unwrap();
        assert_eq!(authority_key(&url).unwrap(), ("example.test".to_owned(), 80));
    }

    #[test]
    fn authority_key_honors_explicit_port() {
        let url = Url::parse("http://example.test:9000/widgets").unwrap();
        assert_eq!(authority_key(&url).unwrap(), ("example.test".to_owned(), 9000));
    }
}
