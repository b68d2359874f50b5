//! C3: Input Channel. Debits receive credit as DATA arrives and emits
//! WINDOW_UPDATE before credit runs out. Grounded on the base crate's
//! `Input`/budget bookkeeping (there folded into `stream.rs`), matched
//! against `asio_http::v2::Input` in the original source for the exact
//! quantized-increment policy (§4.3).

use crate::enums::FrameType;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::stream::Stream;
use crate::types::DEFAULT_WINDOW_SIZE;
use tokio::io::AsyncWrite;

pub struct InputChannel {
    /// Connection-level receive credit (§3).
    conn_recv_window: i64,
}

impl InputChannel {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conn_recv_window: i64::from(DEFAULT_WINDOW_SIZE),
        }
    }

    /// §4.3 `append`: appends `bytes` to the stream's assembly buffer,
    /// debits both windows, and synthesizes WINDOW_UPDATE frames once
    /// either drops below the initial window size. The increment emitted
    /// is always exactly `DEFAULT_WINDOW_SIZE`, never the deficit, so
    /// credit stays quantized and predictable.
    ///
    /// No stream-level WINDOW_UPDATE is sent once the stream has observed
    /// END_STREAM (the spec's chosen policy for an ambiguity in the
    /// original source, §9).
    pub async fn append<W: AsyncWrite + Unpin>(
        &mut self,
        writer: &mut W,
        stream: &mut Stream,
        bytes: &[u8],
        more_expected: bool,
    ) -> Result<()> {
        let len = bytes.len() as i64;
        // §7 `FlowControlError`: a peer that sends more than its granted
        // window is a fatal protocol violation, not something to debit into
        // the negative and paper over.
        if len > stream.recv_window || len > self.conn_recv_window {
            return Err(Error::FlowControl(
                "peer sent more DATA than its receive window allowed",
            ));
        }
        stream.body.extend_from_slice(bytes);
        stream.recv_window -= len;
        self.conn_recv_window -= len;

        if self.conn_recv_window < i64::from(DEFAULT_WINDOW_SIZE) {
            Self::send_window_update(writer, 0).await?;
            self.conn_recv_window += i64::from(DEFAULT_WINDOW_SIZE);
        }

        if more_expected
            && !stream.is_half_closed_remote()
            && stream.recv_window < i64::from(DEFAULT_WINDOW_SIZE)
        {
            Self::send_window_update(writer, stream.id.get()).await?;
            stream.recv_window += i64::from(DEFAULT_WINDOW_SIZE);
        }

        Ok(())
    }

    async fn send_window_update<W: AsyncWrite + Unpin>(writer: &mut W, stream_id: u32) -> Result<()> {
        Frame::write_raw(
            writer,
            FrameType::WindowUpdate.byte(),
            0,
            stream_id,
            &DEFAULT_WINDOW_SIZE.to_be_bytes(),
        )
        .await
    }

    /// §4.3 `extract`: moves the accumulated body out, releasing it from
    /// the channel's bookkeeping (the stream slot itself is released by the
    /// session when it removes the entry from its stream table).
    pub fn extract(stream: &mut Stream) -> bytes::Bytes {
        std::mem::take(&mut stream.body).freeze()
    }
}

impl Default for InputChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    #[tokio::test]
    async fn append_debits_both_windows() {
        let mut input = InputChannel::new();
        let mut stream = Stream::new(NonZeroU32::new(1).unwrap());
        stream.on_headers_received(false);
        let mut sink = Vec::new();

        input.append(&mut sink, &mut stream, &[0u8; 100], true).await.unwrap();
        assert_eq!(stream.recv_window, i64::from(DEFAULT_WINDOW_SIZE) - 100);
        assert_eq!(input.conn_recv_window, i64::from(DEFAULT_WINDOW_SIZE) - 100);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn low_window_emits_quantized_window_update() {
        let mut input = InputChannel::new();
        let mut stream = Stream::new(NonZeroU32::new(1).unwrap());
        stream.on_headers_received(false);
        let big = vec![0u8; 70_000.min(DEFAULT_WINDOW_SIZE as usize)];
        let mut sink = Vec::new();

        input.append(&mut sink, &mut stream, &big, true).await.unwrap();
        // both windows now below the threshold: two WINDOW_UPDATE frames (conn + stream),
        // each 9-byte header + 4-byte increment payload
        assert_eq!(sink.len(), 26);
        let increment = u32::from_be_bytes(sink[9..13].try_into().unwrap());
        assert_eq!(increment, DEFAULT_WINDOW_SIZE);
    }

    #[tokio::test]
    async fn no_stream_update_after_end_stream() {
        let mut input = InputChannel::new();
        let mut stream = Stream::new(NonZeroU32::new(1).unwrap());
        stream.on_headers_received(false);
        stream.on_data_received(true);
        let mut sink = Vec::new();

        input
            .append(&mut sink, &mut stream, &vec![0u8; 65_535], false)
            .await
            .unwrap();
        // only the connection-level update (header + 4-byte increment) should have been emitted
        assert_eq!(sink.len(), 13);
    }

    #[tokio::test]
    async fn over_sent_data_is_a_fatal_flow_control_error() {
        let mut input = InputChannel::new();
        let mut stream = Stream::new(NonZeroU32::new(1).unwrap());
        stream.on_headers_received(false);
        let mut sink = Vec::new();

        let over_budget = vec![0u8; DEFAULT_WINDOW_SIZE as usize + 1];
        let result = input.append(&mut sink, &mut stream, &over_budget, true).await;
        assert!(matches!(result, Err(crate::error::Error::FlowControl(_))));
        assert!(stream.body.is_empty(), "an over-budget send must not be appended");
    }
}
