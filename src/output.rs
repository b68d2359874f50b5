//! C4: Output Channel. Fragments application bodies into DATA frames
//! subject to MAX_FRAME_SIZE and credit windows, and writes immediate
//! frames (HEADERS, SETTINGS, WINDOW_UPDATE, acks) straight through.
//! Grounded on the base crate's absent-but-implied output path plus
//! `asio_http::v2::Output` in the original source for the exact
//! fairness/"insufficient credit" policy (§4.4).

use crate::enums::FrameType;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::stream::Stream;
use crate::types::{
    NonZeroStreamId, DEFAULT_MAX_FRAME_SIZE, MAX_STREAM_EXCLUSIVE, MIN_FRAME_SIZE,
};
use bytes::Bytes;
use std::collections::HashMap;
use tokio::io::AsyncWrite;

struct QueueEntry {
    body: Bytes,
    offset: usize,
}

impl QueueEntry {
    fn remaining(&self) -> usize {
        self.body.len() - self.offset
    }
}

pub struct OutputChannel {
    conn_send_window: i64,
    /// Insertion-ordered stream ids with a pending body, so `flush` can
    /// give every stream a fair turn instead of starving late arrivals
    /// behind one large body (§4.4 Fairness).
    order: Vec<NonZeroStreamId>,
    queue: HashMap<NonZeroStreamId, QueueEntry>,
}

impl OutputChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conn_send_window: i64::from(crate::types::DEFAULT_WINDOW_SIZE),
            order: Vec::new(),
            queue: HashMap::new(),
        }
    }

    /// §4.4 `send`: a single, fully-budgeted frame -- used for HEADERS,
    /// SETTINGS, WINDOW_UPDATE, and ACKs.
    pub async fn send<W: AsyncWrite + Unpin>(
        writer: &mut W,
        type_byte: u8,
        flags: u8,
        stream: u32,
        payload: &[u8],
    ) -> Result<()> {
        Frame::write_raw(writer, type_byte, flags, stream, payload).await
    }

    /// §4.4 `enqueue`: stores a body for later fragmented emission,
    /// overwriting any prior body for the same stream id.
    pub fn enqueue(&mut self, stream_id: NonZeroStreamId, body: Bytes) {
        if !self.queue.contains_key(&stream_id) {
            self.order.push(stream_id);
        }
        self.queue.insert(stream_id, QueueEntry { body, offset: 0 });
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// §4.4 `flush`: drains the send queue, one DATA frame per stream per
    /// pass, respecting connection- and stream-level credit and the
    /// negotiated max frame size.
    pub async fn flush<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        streams: &mut HashMap<NonZeroStreamId, Stream>,
    ) -> Result<()> {
        let mut finished = Vec::new();

        for &stream_id in &self.order {
            let Some(entry) = self.queue.get_mut(&stream_id) else {
                continue;
            };
            let Some(stream) = streams.get_mut(&stream_id) else {
                finished.push(stream_id);
                continue;
            };

            let remaining = entry.remaining();
            if remaining == 0 {
                finished.push(stream_id);
                continue;
            }

            let chunk = [
                self.conn_send_window.max(0) as u64,
                stream.send_window.max(0) as u64,
                remaining as u64,
                u64::from(MAX_STREAM_EXCLUSIVE),
                u64::from(DEFAULT_MAX_FRAME_SIZE),
            ]
            .into_iter()
            .min()
            .unwrap_or(0) as usize;

            let is_last = chunk == remaining;
            if chunk < MIN_FRAME_SIZE as usize && !is_last {
                // insufficient credit; wait for WINDOW_UPDATE
                continue;
            }

            let start = entry.offset;
            let data = entry.body.slice(start..start + chunk);
            let flags = if is_last { 0x1 } else { 0x0 }; // END_STREAM
            Frame::write_raw(writer, FrameType::Data.byte(), flags, stream_id.get(), &data).await?;

            self.conn_send_window -= chunk as i64;
            stream.send_window -= chunk as i64;
            entry.offset += chunk;

            if is_last {
                finished.push(stream_id);
            }
        }

        for stream_id in finished {
            self.queue.remove(&stream_id);
            self.order.retain(|id| *id != stream_id);
            // §3 invariant 4: once the last DATA frame (END_STREAM) for this
            // stream has gone out, the write loop has no further use for its
            // send-side bookkeeping; release the slot rather than leaving it
            // in the table for the rest of the connection's life.
            streams.remove(&stream_id);
        }
        Ok(())
    }

    /// §4.4 `window_update`: credits the connection-level window (stream id
    /// 0) or a specific stream's window.
    pub fn apply_window_update(
        &mut self,
        stream_id: u32,
        increment: u32,
        streams: &mut HashMap<NonZeroStreamId, Stream>,
    ) -> Result<()> {
        if increment == 0 {
            return Err(Error::FlowControl("WINDOW_UPDATE increment of 0 is invalid"));
        }
        if stream_id == 0 {
            self.conn_send_window += i64::from(increment);
        } else if let Some(id) = NonZeroStreamId::new(stream_id) {
            if let Some(stream) = streams.get_mut(&id) {
                stream.send_window += i64::from(increment);
            }
        }
        Ok(())
    }

    /// Parses the 4-byte WINDOW_UPDATE payload (top bit cleared).
    pub fn parse_increment(payload: &[u8]) -> Result<u32> {
        if payload.len() != 4 {
            return Err(Error::MalformedFrame("WINDOW_UPDATE payload must be 4 bytes"));
        }
        let raw = u32::from_be_bytes(payload.try_into().unwrap());
        Ok(raw & crate::types::U31_MAX.get())
    }
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn id(n: u32) -> NonZeroStreamId {
        NonZeroU32::new(n).unwrap()
    }

    #[tokio::test]
    async fn large_body_fragments_into_max_frame_sized_chunks() {
        let mut output = OutputChannel::new();
        output.conn_send_window = 1_000_000;
        let mut streams = HashMap::new();
        streams.insert(id(1), {
            let mut s = Stream::new(id(1));
            s.send_window = 1_000_000;
            s
        });

        output.enqueue(id(1), Bytes::from(vec![0u8; 50_000]));
        let mut sink = Vec::new();
        let mut sizes = Vec::new();
        while !output.is_idle() {
            let before = sink.len();
            output.flush(&mut sink, &mut streams).await.unwrap();
            sizes.push(sink.len() - before - 9);
        }
        assert_eq!(sizes, vec![16_384, 16_384, 16_384, 848]);
    }

    #[tokio::test]
    async fn low_credit_defers_fragmentation() {
        let mut output = OutputChannel::new();
        output.conn_send_window = 1_000; // below MIN_FRAME_SIZE
        let mut streams = HashMap::new();
        streams.insert(id(1), {
            let mut s = Stream::new(id(1));
            s.send_window = 1_000_000;
            s
        });
        output.enqueue(id(1), Bytes::from(vec![0u8; 50_000]));

        let mut sink = Vec::new();
        output.flush(&mut sink, &mut streams).await.unwrap();
        assert!(sink.is_empty());
        assert!(!output.is_idle());
    }

    #[tokio::test]
    async fn window_update_credits_connection_and_stream() {
        let mut output = OutputChannel::new();
        let mut streams = HashMap::new();
        streams.insert(id(3), Stream::new(id(3)));

        output.apply_window_update(0, 1_000, &mut streams).unwrap();
        output.apply_window_update(3, 500, &mut streams).unwrap();
        assert_eq!(output.conn_send_window, i64::from(crate::types::DEFAULT_WINDOW_SIZE) + 1_000);
        assert_eq!(streams[&id(3)].send_window, i64::from(crate::types::DEFAULT_WINDOW_SIZE) + 500);
    }

    #[tokio::test]
    async fn zero_increment_is_rejected() {
        let mut output = OutputChannel::new();
        let mut streams = HashMap::new();
        assert!(output.apply_window_update(0, 0, &mut streams).is_err());
    }

    #[tokio::test]
    async fn finished_stream_is_pruned_from_the_table() {
        let mut output = OutputChannel::new();
        output.conn_send_window = 1_000_000;
        let mut streams = HashMap::new();
        streams.insert(id(1), {
            let mut s = Stream::new(id(1));
            s.send_window = 1_000_000;
            s
        });

        output.enqueue(id(1), Bytes::from_static(b"short body"));
        let mut sink = Vec::new();
        output.flush(&mut sink, &mut streams).await.unwrap();

        assert!(output.is_idle());
        assert!(!streams.contains_key(&id(1)));
    }
}
