//! Public server facade (§6). Grounded on the base crate's `stream.rs`
//! accept-loop shape (there synchronous, one `std::thread` per connection),
//! generalized to one tokio task per connection plus the two-task session
//! driver from `session.rs`.

use crate::error::Result;
use crate::session::{run_server_connection, Handler, HandlerTable};
use crate::types::{DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MAX_CONCURRENT_STREAMS};
use log::{debug, warn};
use tokio::net::{TcpListener, ToSocketAddrs};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// §9 Open Question: recorded for operators, not enforced by the core
    /// (no RST_STREAM/REFUSED_STREAM path exists to act on it, §1 Non-goals).
    pub max_concurrent_streams: usize,
    pub strict_framing: bool,
    /// §5: a connection idle between requests longer than this is dropped.
    pub idle_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: DEFAULT_MAX_CONCURRENT_STREAMS,
            strict_framing: false,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

/// §6: a route table plus the accept loop that spawns one session per
/// incoming connection.
#[derive(Default)]
pub struct Server {
    config: ServerConfig,
    handlers: HandlerTable,
}

impl Server {
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            handlers: HandlerTable::default(),
        }
    }

    /// §6 `register_handler`: first-registered-prefix-wins; unmatched paths
    /// get a 404 from `session.rs`.
    pub fn register_handler(&mut self, path_prefix: impl Into<String>, handler: Handler) {
        self.handlers.register(path_prefix, handler);
    }

    /// Binds `addr` and serves connections until the listener errors or the
    /// process is killed; each connection runs its own session driver task
    /// and a failure in one never affects the others.
    pub async fn run(self, addr: impl ToSocketAddrs) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Like `run`, but over a listener the caller already bound -- useful
    /// for tests that need the ephemeral port before the accept loop starts.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let strict = self.config.strict_framing;
        let idle_timeout_ms = self.config.idle_timeout_ms;
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!("accepted connection from {peer}");
            let handlers = self.handlers.clone();
            tokio::spawn(async move {
                if let Err(err) = run_server_connection(stream, handlers, strict, idle_timeout_ms).await {
                    warn!("connection from {peer} ended: {err}");
                }
            });
        }
    }
}
