//! C2: HPACK Codec. A thin, stateful wrapper around the `hpack` crate
//! (RFC 7541), treated as an opaque collaborator per §4.2 -- the engine
//! only needs `deflate`/`inflate` plus the pseudo-header ordering and
//! lower-casing rules the spec requires on top of it.

use crate::error::{Error, Result};
use crate::types::{Headers, DEFAULT_HEADER_TABLE_SIZE};
use bytes::Bytes;

pub struct Encoder {
    inner: hpack::Encoder<'static>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: hpack::Encoder::new(),
        }
    }

    /// §4.2 `deflate`: pseudo-headers (`:method`, `:path`, ...) first, in
    /// the order given; then regular headers. Names are lower-cased, values
    /// are left verbatim.
    pub fn deflate(&mut self, headers: &Headers) -> Bytes {
        let mut pseudo = Vec::new();
        let mut regular = Vec::new();
        for (name, value) in headers {
            let name = name.to_ascii_lowercase();
            if name.starts_with(':') {
                pseudo.push((name, value.clone()));
            } else {
                regular.push((name, value.clone()));
            }
        }
        pseudo.extend(regular);

        let encoded = self
            .inner
            .encode(pseudo.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())));
        Bytes::from(encoded)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Decoder {
    inner: hpack::Decoder<'static>,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: hpack::Decoder::new(),
        }
    }

    /// §4.2 `inflate`: decodes a header block, invoking `emit(name, value)`
    /// in order. Illegal pseudo-header order (a pseudo-header appearing
    /// after a regular header) is a `HeaderBlockError`, fatal to the
    /// connection.
    pub fn inflate(&mut self, block: &[u8], mut emit: impl FnMut(String, String)) -> Result<()> {
        let mut seen_regular = false;
        let mut order_error = false;

        self.inner
            .decode_with_cb(block, |name, value| {
                let name = String::from_utf8_lossy(name.as_ref()).into_owned();
                let value = String::from_utf8_lossy(value.as_ref()).into_owned();
                if name.starts_with(':') {
                    if seen_regular {
                        order_error = true;
                    }
                } else {
                    seen_regular = true;
                }
                emit(name, value);
            })
            .map_err(|e| Error::HeaderBlock(format!("{e:?}")))?;

        if order_error {
            return Err(Error::HeaderBlock(
                "pseudo-header appeared after a regular header".to_owned(),
            ));
        }
        Ok(())
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Both directions start with a dynamic table bounded by
/// `DEFAULT_HEADER_TABLE_SIZE`; kept as a named constant so callers don't
/// need to know the `hpack` crate's own default matches the spec's.
#[must_use]
pub fn default_table_size() -> usize {
    DEFAULT_HEADER_TABLE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_order_and_pseudo_headers_first() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();

        let headers: Headers = vec![
            (":method".to_owned(), "GET".to_owned()),
            (":path".to_owned(), "/test".to_owned()),
            ("accept".to_owned(), "*/*".to_owned()),
        ];
        let block = encoder.deflate(&headers);

        let mut seen = Vec::new();
        decoder
            .inflate(&block, |name, value| seen.push((name, value)))
            .unwrap();
        assert_eq!(seen, headers);
    }

    #[test]
    fn names_are_lower_cased_on_encode() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();
        let headers: Headers = vec![("X-Request-Id".to_owned(), "abc".to_owned())];
        let block = encoder.deflate(&headers);

        let mut seen = Vec::new();
        decoder
            .inflate(&block, |name, value| seen.push((name, value)))
            .unwrap();
        assert_eq!(seen, vec![("x-request-id".to_owned(), "abc".to_owned())]);
    }

    #[test]
    fn dynamic_table_keeps_state_across_calls() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();
        let headers: Headers = vec![("user-agent".to_owned(), "http2-test/1.0".to_owned())];

        let first = encoder.deflate(&headers);
        let second = encoder.deflate(&headers);
        assert!(second.len() <= first.len());

        let mut seen = Vec::new();
        decoder.inflate(&first, |n, v| seen.push((n, v))).unwrap();
        decoder.inflate(&second, |n, v| seen.push((n, v))).unwrap();
        assert_eq!(seen, vec![headers[0].clone(), headers[0].clone()]);
    }
}
