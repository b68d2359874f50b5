//! Shared wire constants and small type aliases used across the codec,
//! flow-control, and session modules. Grounded on the base crate's
//! `types.rs`, trimmed to the constants the spec actually names.

use std::num::NonZeroU32;

pub type StreamId = u32;
pub type NonZeroStreamId = NonZeroU32;

/// An ordered list of (name, value) pairs -- the shape HPACK deflates and
/// inflates, and the shape `Request`/`Response` headers are stored in.
pub type Headers = Vec<(String, String)>;

/// Safety: `u32::MAX >> 1` is `0x7FFF_FFFF`, never zero.
pub const U31_MAX: NonZeroU32 = unsafe { NonZeroU32::new_unchecked(u32::MAX >> 1) };

/// §3: initial per-connection and per-stream receive/send window.
pub const DEFAULT_WINDOW_SIZE: u32 = 65_535;
/// §4.4: the engine never sends frames larger than this without renegotiation.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
/// §4.4: engine-side cap on outstanding bytes queued per stream write pass.
pub const MAX_STREAM_EXCLUSIVE: u32 = 131_072;
/// §4.4: threshold below which fragmentation is deferred to accumulate credit.
pub const MIN_FRAME_SIZE: u32 = 4_096;
/// §4.2: HPACK dynamic table capacity, both directions.
pub const DEFAULT_HEADER_TABLE_SIZE: usize = 4_096;

/// §3/§6: the fixed 24-byte magic a client writes and a server reads first.
pub const PREFACE: &[u8; 24] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// §9 Open Question: a conservative default; not enforced by the core.
pub const DEFAULT_MAX_CONCURRENT_STREAMS: usize = 100;

/// §5: default timeouts.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 100;
pub const DEFAULT_TOTAL_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 10_000;

/// The write loop's coalescing timer (§4.6/§9): wake at most this often to
/// drain the send queue when more body remains queued.
pub const WRITE_COALESCE_MS: u64 = 1;
