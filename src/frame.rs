//! C1: Frame Codec. Converts between the 9-byte on-wire frame header and an
//! in-memory representation, and writes header+payload as a single logical
//! write so a partial write can never split them at the application level
//! (§4.1). Grounded on the base crate's async `Frame::try_from_stream` /
//! `write_into`, ported from `async_std::io` to `tokio::io`.

use crate::error::{Error, Result};
use crate::types::U31_MAX;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The decoded 9-byte frame header. `type_byte` is kept raw (not resolved to
/// `enums::FrameType`) because §3 requires unknown types to be read and
/// discarded rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub type_byte: u8,
    pub flags: u8,
    pub stream: u32,
}

impl FrameHeader {
    /// §4.1 `encode_header`. Fails if `length` or `stream` overflow their
    /// wire width.
    pub fn encode(length: u32, type_byte: u8, flags: u8, stream: u32) -> Result<[u8; 9]> {
        if length > 0x00FF_FFFF {
            return Err(Error::MalformedFrame("frame length exceeds 2^24 - 1"));
        }
        if stream > U31_MAX.get() {
            return Err(Error::MalformedFrame("stream id exceeds 2^31 - 1"));
        }
        let length_bytes = length.to_be_bytes();
        let stream_bytes = stream.to_be_bytes();
        Ok([
            length_bytes[1],
            length_bytes[2],
            length_bytes[3],
            type_byte,
            flags,
            stream_bytes[0],
            stream_bytes[1],
            stream_bytes[2],
            stream_bytes[3],
        ])
    }

    /// §4.1 `decode_header`. In non-strict mode (the default) the reserved
    /// top bit of the stream id is masked off; in strict mode its presence
    /// is a `MalformedFrame`.
    pub fn decode(bytes: [u8; 9], strict: bool) -> Result<Self> {
        let length = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let type_byte = bytes[3];
        let flags = bytes[4];
        let raw_stream = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        if strict && raw_stream & 0x8000_0000 != 0 {
            return Err(Error::MalformedFrame("reserved bit set on stream id"));
        }
        let stream = raw_stream & U31_MAX.get();
        Ok(Self {
            length,
            type_byte,
            flags,
            stream,
        })
    }
}

/// An ephemeral frame: exists only during a single codec pass (§3 Lifecycle).
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    /// Cooperatively suspends until a whole frame (header, then payload) has
    /// arrived. A zero-length payload is valid and yields an empty `Bytes`.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R, strict: bool) -> Result<Self> {
        let mut header_buf = [0u8; 9];
        reader
            .read_exact(&mut header_buf)
            .await
            .map_err(|e| io_to_error(e, "frame header"))?;
        let header = FrameHeader::decode(header_buf, strict)?;

        let mut payload = vec![0u8; header.length as usize];
        if header.length > 0 {
            reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| io_to_error(e, "frame payload"))?;
        }
        Ok(Self {
            header,
            payload: Bytes::from(payload),
        })
    }

    /// §4.1 `write_frame`: header and payload go out as one logical write.
    pub async fn write_raw<W: AsyncWrite + Unpin>(
        writer: &mut W,
        type_byte: u8,
        flags: u8,
        stream: u32,
        payload: &[u8],
    ) -> Result<()> {
        let header = FrameHeader::encode(payload.len() as u32, type_byte, flags, stream)?;
        let mut out = Vec::with_capacity(9 + payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(payload);
        writer.write_all(&out).await?;
        Ok(())
    }
}

fn io_to_error(err: std::io::Error, what: &'static str) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("connection closed mid-{what}"),
        ))
    } else {
        Error::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let bytes = FrameHeader::encode(42, 0x1, 0x4, 3).unwrap();
        let header = FrameHeader::decode(bytes, false).unwrap();
        assert_eq!(header.length, 42);
        assert_eq!(header.type_byte, 0x1);
        assert_eq!(header.flags, 0x4);
        assert_eq!(header.stream, 3);
    }

    #[test]
    fn zero_length_payload_is_nine_bytes() {
        let bytes = FrameHeader::encode(0, 0x4, 0, 0).unwrap();
        assert_eq!(bytes.len(), 9);
    }

    #[test]
    fn length_overflow_is_rejected() {
        assert!(FrameHeader::encode(0x0100_0000, 0, 0, 0).is_err());
    }

    #[test]
    fn stream_overflow_is_rejected() {
        assert!(FrameHeader::encode(0, 0, 0, 0x8000_0000).is_err());
    }

    #[test]
    fn reserved_bit_is_masked_by_default() {
        let mut bytes = FrameHeader::encode(0, 0, 0, 5).unwrap();
        bytes[5] |= 0x80;
        let header = FrameHeader::decode(bytes, false).unwrap();
        assert_eq!(header.stream, 5);
    }

    #[test]
    fn reserved_bit_is_rejected_in_strict_mode() {
        let mut bytes = FrameHeader::encode(0, 0, 0, 5).unwrap();
        bytes[5] |= 0x80;
        assert!(FrameHeader::decode(bytes, true).is_err());
    }

    #[tokio::test]
    async fn read_from_parses_header_and_payload() {
        let mut wire = FrameHeader::encode(4, 0x8, 0, 0).unwrap().to_vec();
        wire.extend_from_slice(b"\0\0\xff\xff");
        let mut cursor = std::io::Cursor::new(wire);
        let frame = Frame::read_from(&mut cursor, false).await.unwrap();
        assert_eq!(frame.header.length, 4);
        assert_eq!(&frame.payload[..], b"\0\0\xff\xff");
    }
}
