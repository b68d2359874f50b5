//! Per-stream bookkeeping: header/body assembly and the receive-side state
//! machine from §4.3. One `Stream` exists per active stream id and lives in
//! the session's stream table (§3 "Streams are owned by the session").
//! Grounded on the base crate's `stream.rs`, simplified to the state
//! diagram the spec actually gives (push/priority/reset are Non-goals, §1).

use crate::types::{Headers, NonZeroStreamId, DEFAULT_WINDOW_SIZE};
use bytes::BytesMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedRemote,
    Closed,
}

pub struct Stream {
    pub id: NonZeroStreamId,
    pub state: StreamState,

    /// Remaining receive credit before a WINDOW_UPDATE must be emitted.
    pub recv_window: i64,
    /// Remaining credit the peer has granted us to send DATA on this stream.
    pub send_window: i64,

    /// Set once a HEADERS frame with END_STREAM has been seen; used to
    /// decide whether END_HEADERS alone completes the stream (§3).
    pub no_body: bool,
    /// True between a HEADERS/PUSH_PROMISE without END_HEADERS and its
    /// closing CONTINUATION; no other frame may interleave on this stream
    /// while true (§3 invariant 5).
    pub continuing: bool,

    /// Decoded headers, accumulated in wire order.
    pub headers: Headers,
    /// Raw header-block fragments from HEADERS and any CONTINUATION frames,
    /// concatenated as they arrive. The `hpack` crate's decoder parses a
    /// buffer as a complete sequence of field representations and keeps no
    /// state across calls, so a field split across the HEADERS/CONTINUATION
    /// boundary (§3 invariant 5) can only decode correctly if the whole
    /// block is inflated in one pass, once END_HEADERS is seen.
    pub header_block: BytesMut,
    /// Accumulated DATA payload.
    pub body: BytesMut,
}

impl Stream {
    #[must_use]
    pub fn new(id: NonZeroStreamId) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            recv_window: i64::from(DEFAULT_WINDOW_SIZE),
            send_window: i64::from(DEFAULT_WINDOW_SIZE),
            no_body: false,
            continuing: false,
            headers: Vec::new(),
            header_block: BytesMut::new(),
            body: BytesMut::new(),
        }
    }

    /// §4.3 state machine, receive side only (the core never needs the send
    /// side beyond "has END_STREAM gone out", tracked by the output channel).
    pub fn on_headers_received(&mut self, end_stream: bool) {
        match self.state {
            StreamState::Idle => {
                self.state = if end_stream {
                    StreamState::HalfClosedRemote
                } else {
                    StreamState::Open
                };
            }
            StreamState::Open if end_stream => {
                self.state = StreamState::HalfClosedRemote;
            }
            _ => {}
        }
        if end_stream {
            self.no_body = true;
        }
    }

    pub fn on_data_received(&mut self, end_stream: bool) {
        if end_stream && self.state == StreamState::Open {
            self.state = StreamState::HalfClosedRemote;
        }
    }

    /// §3 invariant 4: a stream transitions to closed exactly once.
    pub fn close(&mut self) {
        self.state = StreamState::Closed;
    }

    #[must_use]
    pub fn is_half_closed_remote(&self) -> bool {
        self.state == StreamState::HalfClosedRemote
    }
}
