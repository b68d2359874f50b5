//! The application-facing `Response` type (§6), shared by the HTTP/2 engine
//! and the HTTP/1.1 peripheral. Grounded on the base crate's `response.rs`.

use crate::error::{Error, Result};
use crate::types::Headers;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct Response {
    pub request_id: usize,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: impl Into<Bytes>) -> Self {
        let mut full_headers = vec![(":status".to_owned(), status.to_string())];
        full_headers.extend(headers);
        Self {
            request_id: 0,
            headers: full_headers,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// §6: `:status` carries the numeric status code as ASCII.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.header(":status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    #[must_use]
    pub fn regular_headers(&self) -> Headers {
        self.headers
            .iter()
            .filter(|(k, _)| !k.starts_with(':'))
            .cloned()
            .collect()
    }

    /// §6: "the engine auto-fills the `server` response header if unset."
    /// A no-op if the handler already set one.
    pub fn fill_default_server_header(&mut self) {
        if self.header("server").is_none() {
            self.headers
                .push(("server".to_owned(), concat!("http2/", env!("CARGO_PKG_VERSION")).to_owned()));
        }
    }

    /// Client-only error surfacing (§7 `RemoteStatusError`): verbatim to the
    /// caller, does not close the connection.
    pub fn into_result(self) -> Result<Self> {
        if self.status() >= 400 {
            Err(Error::RemoteStatus(self.status()))
        } else {
            Ok(self)
        }
    }

    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> anyhow::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}
