//! Crate-wide error taxonomy, per the engine's error handling design: every
//! fatal variant closes the connection, every local variant stays scoped to
//! one request. Modeled the same way `types::FrameDecodeError` was modeled
//! in the base crate -- a `thiserror` enum, one `#[error("...")]` per cause.

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Socket failure: read/write EOF, connect failure, timeout. Fatal.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Impossible field values in a decoded frame header. Fatal.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// HPACK decode failure or illegal pseudo-header order. Fatal.
    #[error("header block error: {0}")]
    HeaderBlock(String),

    /// Peer sent more DATA than its receive window allowed. Fatal.
    #[error("flow control error: {0}")]
    FlowControl(&'static str),

    /// Duplicate/out-of-order stream id, or 31-bit id space exhaustion. Fatal.
    #[error("stream id error: {0}")]
    StreamId(&'static str),

    /// A server handler panicked or returned an error. Local to one request.
    #[error("application error: {0}")]
    Application(String),

    /// The peer returned a 4xx/5xx status (client only). Not fatal.
    #[error("remote returned status {0}")]
    RemoteStatus(u16),

    /// The peer sent GOAWAY or otherwise ended the session cleanly.
    #[error("connection closed")]
    Closed,

    /// An operation did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Fatal errors close the socket and fail every outstanding completion;
    /// `Application` and `RemoteStatus` are confined to one request instead.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Application(_) | Error::RemoteStatus(_))
    }
}
