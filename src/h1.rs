//! HTTP/1.1 peripheral (§6 expansion). A strict subset: request line,
//! headers, a blank line, then a `Content-Length` or EOF-delimited body --
//! no chunked transfer encoding, no trailers, no pipelining. Grounded on
//! `original_source/v1/Alive.hpp`'s keep-alive `Manager`/`KeyPool` for the
//! pool shape, ported from its callback-based acquire/release to a tokio
//! `Mutex<HashMap<..>>` plus an `mpsc` return channel -- the same channel
//! shape the base crate already uses in `stream_coordinator.rs`.

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::Response;
use bytes::{Bytes, BytesMut};
use log::trace;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

/// Writes `request` as an HTTP/1.1 request line + headers + body.
pub async fn write_request<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, request: &Request) -> Result<()> {
    let mut out = format!(
        "{} {} HTTP/1.1\r\n",
        request.method(),
        request.path(),
    );
    out.push_str("host: ");
    out.push_str(request.url.host_str().unwrap_or_default());
    if let Some(port) = request.url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str("\r\n");
    for (name, value) in request.regular_headers() {
        out.push_str(&name);
        out.push_str(": ");
        out.push_str(&value);
        out.push_str("\r\n");
    }
    if !request.body.is_empty() {
        out.push_str(&format!("content-length: {}\r\n", request.body.len()));
    }
    out.push_str("\r\n");
    writer.write_all(out.as_bytes()).await?;
    if !request.body.is_empty() {
        writer.write_all(&request.body).await?;
    }
    Ok(())
}

/// Reads an HTTP/1.1 response: status line, headers until a blank line,
/// then a `Content-Length` body (an EOF-delimited body is read until the
/// connection closes, since the peripheral never negotiates chunked).
pub async fn read_response<R: tokio::io::AsyncRead + Unpin>(reader: &mut BufReader<R>) -> Result<Response> {
    let mut status_line = String::new();
    let read = reader.read_line(&mut status_line).await?;
    if read == 0 {
        return Err(Error::Closed);
    }
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(Error::MalformedFrame("malformed HTTP/1.1 status line"))?;

    let mut headers = Vec::new();
    let mut content_length = None;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::MalformedFrame("malformed HTTP/1.1 header line"));
        };
        let name = name.trim().to_ascii_lowercase();
        let value = value.trim().to_owned();
        if name == "content-length" {
            content_length = value.parse::<usize>().ok();
        }
        headers.push((name, value));
    }

    let body = match content_length {
        Some(len) => {
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).await?;
            Bytes::from(buf)
        }
        None => {
            let mut buf = BytesMut::new();
            reader.read_buf(&mut buf).await?;
            buf.freeze()
        }
    };

    trace!("HTTP/1.1 response: {status} ({} header(s), {} body byte(s))", headers.len(), body.len());
    Ok(Response::new(status, headers, body))
}

struct PooledConn {
    stream: TcpStream,
    idle_since: Instant,
}

/// A connection checked out of the pool. Returns itself to the pool on
/// drop via `return_tx`, rather than on an explicit `release` call, so a
/// caller that forgets (or errors out) never leaks the pool slot.
pub struct Checkout {
    stream: Option<TcpStream>,
    key: (String, u16),
    return_tx: mpsc::UnboundedSender<((String, u16), TcpStream)>,
}

impl Checkout {
    pub fn stream(&mut self) -> &mut TcpStream {
        self.stream.as_mut().expect("stream taken only by Drop")
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = self.return_tx.send((self.key.clone(), stream));
        }
    }
}

/// Keep-alive connection pool keyed by `(host, port)` (§6 expansion).
/// Grounded on `original_source/v1/Alive.hpp`'s `Manager`: a map of
/// per-key queues, idle connections reaped after a TTL by a background
/// sweep.
pub struct Pool {
    idle: Arc<Mutex<HashMap<(String, u16), Vec<PooledConn>>>>,
    return_tx: mpsc::UnboundedSender<((String, u16), TcpStream)>,
}

impl Pool {
    #[must_use]
    pub fn new(idle_ttl: Duration) -> Self {
        let idle: Arc<Mutex<HashMap<(String, u16), Vec<PooledConn>>>> = Arc::new(Mutex::new(HashMap::new()));
        let (return_tx, mut return_rx) = mpsc::unbounded_channel::<((String, u16), TcpStream)>();

        let returns_idle = idle.clone();
        tokio::spawn(async move {
            while let Some((key, stream)) = return_rx.recv().await {
                let mut map = returns_idle.lock().await;
                map.entry(key).or_default().push(PooledConn {
                    stream,
                    idle_since: Instant::now(),
                });
            }
        });

        let sweep_idle = idle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticker.tick().await;
                let mut map = sweep_idle.lock().await;
                for conns in map.values_mut() {
                    conns.retain(|c| c.idle_since.elapsed() < idle_ttl);
                }
                map.retain(|_, conns| !conns.is_empty());
            }
        });

        Self { idle, return_tx }
    }

    /// Hands out an idle connection for `key` if one exists and is still
    /// live, otherwise dials a new one.
    pub async fn acquire(&self, host: &str, port: u16) -> Result<Checkout> {
        let key = (host.to_owned(), port);
        let existing = {
            let mut map = self.idle.lock().await;
            map.get_mut(&key).and_then(Vec::pop)
        };
        let stream = match existing {
            Some(pooled) => pooled.stream,
            None => TcpStream::connect((host, port)).await?,
        };
        Ok(Checkout {
            stream: Some(stream),
            key,
            return_tx: self.return_tx.clone(),
        })
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
