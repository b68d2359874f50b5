//! The application-facing `Request` type (§6), shared by the HTTP/2 engine
//! and the HTTP/1.1 peripheral. Grounded on the base crate's `request.rs`,
//! generalized from a `HashMap`-backed header set to the ordered `Headers`
//! the HPACK codec needs (pseudo-headers must come first, §4.2) and from a
//! TLS-only `Url` constructor to a plain host:port split usable by both
//! transports.

use crate::types::Headers;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

static REQUEST_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Method {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "POST")]
    Post,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "DELETE")]
    Delete,
    #[display(fmt = "HEAD")]
    Head,
    #[display(fmt = "PATCH")]
    Patch,
    #[display(fmt = "OPTIONS")]
    Options,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub id: usize,
    pub url: Url,
    /// Pseudo-headers (`:method`, `:scheme`, `:path`, `:authority`) plus
    /// any user-supplied regular headers, in that order (§4.2).
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, url: Url, headers: Option<Headers>, body: impl Into<Bytes>) -> Self {
        // §6: authority carries host only, the port is never appended.
        let authority = url.host_str().unwrap_or_default().to_owned();
        let path = if url.query().is_some() {
            format!("{}?{}", url.path(), url.query().unwrap_or_default())
        } else {
            url.path().to_owned()
        };

        let mut full_headers = vec![
            (":method".to_owned(), method.to_string()),
            (":scheme".to_owned(), url.scheme().to_owned()),
            (":path".to_owned(), path),
            (":authority".to_owned(), authority),
        ];
        if let Some(headers) = headers {
            full_headers.extend(headers);
        }
        Self {
            id: REQUEST_ID.fetch_add(1, Ordering::SeqCst),
            url,
            headers: full_headers,
            body: body.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::Get, url, None, Bytes::new())
    }

    #[inline]
    pub fn post(url: Url, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Post, url, None, body)
    }

    #[inline]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn method(&self) -> &str {
        self.header(":method").unwrap_or("GET")
    }

    #[must_use]
    pub fn path(&self) -> &str {
        self.header(":path").unwrap_or("/")
    }

    /// Regular (non-pseudo) headers, the shape the HTTP/1.1 serializer and
    /// handler-facing API want.
    #[must_use]
    pub fn regular_headers(&self) -> Headers {
        self.headers
            .iter()
            .filter(|(k, _)| !k.starts_with(':'))
            .cloned()
            .collect()
    }

    #[cfg(feature = "json")]
    pub fn post_json<T: serde::Serialize>(url: Url, value: &T) -> anyhow::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(
            Self::new(Method::Post, url, None, body)
                .with_headers(vec![("content-type".to_owned(), "application/json".to_owned())]),
        )
    }
}
