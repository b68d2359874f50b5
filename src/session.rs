//! C5: Session. Owns the preface handshake, the per-stream table, and frame
//! dispatch -- the glue between the wire-level codecs (C1/C2) and the
//! credit-tracking channels (C3/C4). Runs as two tokio tasks per connection,
//! per runtime.rs's model (§4.6): a read loop that owns receive-side state
//! and a write loop that owns send-side state, talking only through
//! `WriteCommand`/`ReadCommand` channels so neither ever locks the other's
//! bookkeeping. The one piece of state both sides touch -- the socket's
//! write half -- is the single `Arc<Mutex<..>>` in the whole engine,
//! grounded on the base crate's `Arc<Mutex<Socket>>` in `connection.rs`.
//!
//! Grounded on `asio_http::v2::Server`/`Client` (the `read_coro`/`write_coro`
//! pair) for the overall shape, and on the base crate's `stream.rs`/
//! `connection.rs` for the Rust-side API surface (`register_handler`,
//! `perform`).

use crate::enums::FrameType;
use crate::error::{Error, Result};
use crate::flags::{ContinuationFlags, DataFlags, HeadersFlags, SettingsFlags};
use crate::frame::Frame;
use crate::hpack::{Decoder, Encoder};
use crate::input::InputChannel;
use crate::output::OutputChannel;
use crate::request::Request;
use crate::response::Response;
use crate::runtime::WriteScheduler;
use crate::stream::Stream;
use crate::types::{Headers, NonZeroStreamId, PREFACE, U31_MAX};
use bytes::Bytes;
use num_traits::FromPrimitive;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Response> + Send>>;
/// A server handler: takes a fully-assembled request, returns a response.
/// §6 "the application supplies one async function per route".
pub type Handler = Arc<dyn Fn(Request) -> HandlerFuture + Send + Sync>;

/// First-prefix-match-wins route table (§6); a miss falls back to 404.
#[derive(Default, Clone)]
pub struct HandlerTable {
    entries: Vec<(String, Handler)>,
}

impl HandlerTable {
    pub fn register(&mut self, path_prefix: impl Into<String>, handler: Handler) {
        self.entries.push((path_prefix.into(), handler));
    }

    fn find(&self, path: &str) -> Option<Handler> {
        self.entries
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, h)| h.clone())
    }
}

pub(crate) enum WriteCommand {
    /// A small control frame with no queued body: SETTINGS, its ACK, or a
    /// connection-level WINDOW_UPDATE synthesized outside the input channel.
    Immediate {
        type_byte: u8,
        flags: u8,
        stream: u32,
        payload: Bytes,
    },
    SendResponse {
        stream_id: NonZeroStreamId,
        response: Response,
    },
    SendRequest {
        request: Request,
        respond_to: oneshot::Sender<Result<Response>>,
    },
    CreditWindow { stream_id: u32, increment: u32 },
}

pub(crate) enum ReadCommand {
    Register {
        stream_id: NonZeroStreamId,
        respond_to: oneshot::Sender<Result<Response>>,
    },
}

enum ReadRole {
    Server(HandlerTable),
    Client,
}

/// What the public `Client` facade holds to reach a connection's write loop.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    to_write: mpsc::UnboundedSender<WriteCommand>,
}

impl SessionHandle {
    /// §4.5 client `perform`: allocate a stream id, send the request, and
    /// await the matching response (or the fatal closure of the session).
    pub(crate) async fn perform(&self, request: Request) -> Result<Response> {
        let (tx, rx) = oneshot::channel();
        self.to_write
            .send(WriteCommand::SendRequest {
                request,
                respond_to: tx,
            })
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }
}

/// §3/§4.5: runs the server side of the preface handshake, then spawns the
/// read/write loops and blocks until either one exits (peer closed the
/// connection, or a fatal protocol error occurred).
pub(crate) async fn run_server_connection(
    stream: TcpStream,
    handlers: HandlerTable,
    strict: bool,
    idle_timeout_ms: u64,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let mut preface = [0u8; 24];
    reader.read_exact(&mut preface).await?;
    if &preface != PREFACE {
        return Err(Error::MalformedFrame("client preface mismatch"));
    }
    Frame::write_raw(&mut writer, FrameType::Settings.byte(), 0, 0, &[]).await?;

    let writer = Arc::new(Mutex::new(writer));
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let (read_tx, read_rx) = mpsc::unbounded_channel();

    let read_task = tokio::spawn(run_read_loop(
        reader,
        ReadRole::Server(handlers),
        writer.clone(),
        read_rx,
        strict,
        write_tx.clone(),
        Some(idle_timeout_ms),
    ));
    let write_task = tokio::spawn(run_write_loop(writer, write_rx, read_tx));

    join_loops(read_task, write_task).await
}

/// §3/§4.5: runs the client side of the preface handshake (write preface +
/// SETTINGS, require the first frame back to be SETTINGS), then spawns the
/// read/write loops and returns a handle the `Client` facade can use to
/// submit requests.
pub(crate) async fn run_client_connection(stream: TcpStream, strict: bool) -> Result<SessionHandle> {
    let (mut reader, mut writer) = stream.into_split();

    writer.write_all(PREFACE).await?;
    Frame::write_raw(&mut writer, FrameType::Settings.byte(), 0, 0, &[]).await?;

    let first = Frame::read_from(&mut reader, strict).await?;
    if FrameType::from_u8(first.header.type_byte) != Some(FrameType::Settings) {
        return Err(Error::MalformedFrame(
            "first frame received from server was not SETTINGS",
        ));
    }
    let first_flags = SettingsFlags::from_bits_truncate(first.header.flags);
    if !first_flags.contains(SettingsFlags::ACK) {
        Frame::write_raw(&mut writer, FrameType::Settings.byte(), SettingsFlags::ACK.bits(), 0, &[]).await?;
    }

    let writer = Arc::new(Mutex::new(writer));
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let (read_tx, read_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_read_loop(
        reader,
        ReadRole::Client,
        writer.clone(),
        read_rx,
        strict,
        write_tx.clone(),
        None,
    ));
    tokio::spawn(run_write_loop(writer, write_rx, read_tx));

    Ok(SessionHandle { to_write: write_tx })
}

async fn join_loops(
    read_task: tokio::task::JoinHandle<Result<()>>,
    write_task: tokio::task::JoinHandle<Result<()>>,
) -> Result<()> {
    let (read_res, write_res) = tokio::join!(read_task, write_task);
    read_res.map_err(|_| Error::Closed)??;
    write_res.map_err(|_| Error::Closed)??;
    Ok(())
}

async fn run_read_loop(
    mut reader: OwnedReadHalf,
    role: ReadRole,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    mut read_cmd_rx: mpsc::UnboundedReceiver<ReadCommand>,
    strict: bool,
    to_write: mpsc::UnboundedSender<WriteCommand>,
    idle_timeout_ms: Option<u64>,
) -> Result<()> {
    let mut decoder = Decoder::new();
    let mut input = InputChannel::new();
    let mut streams: HashMap<NonZeroStreamId, Stream> = HashMap::new();
    let mut completions: HashMap<NonZeroStreamId, oneshot::Sender<Result<Response>>> = HashMap::new();

    loop {
        // The write loop registers a completion right after it puts the
        // request's HEADERS frame on the wire (§4.5), long before any
        // response could physically arrive; draining here before the next
        // blocking read keeps the registration visible to `maybe_dispatch`.
        while let Ok(ReadCommand::Register {
            stream_id,
            respond_to,
        }) = read_cmd_rx.try_recv()
        {
            completions.insert(stream_id, respond_to);
        }

        // §5: the server drops a connection that sits idle between requests
        // past `idle_timeout_ms`; a timed-out read surfaces as the same
        // fatal `Error::Io` any other dead socket would.
        let read: Result<Frame> = match idle_timeout_ms {
            Some(ms) => match crate::runtime::with_deadline(ms, Frame::read_from(&mut reader, strict)).await {
                Ok(inner) => inner,
                Err(_timeout) => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "idle timeout waiting for the next frame",
                ))),
            },
            None => Frame::read_from(&mut reader, strict).await,
        };
        let frame = match read {
            Ok(frame) => frame,
            Err(err) => {
                fail_all(completions);
                return Err(err);
            }
        };

        if let Err(err) = dispatch_frame(
            frame,
            &mut decoder,
            &mut input,
            &mut streams,
            &writer,
            &role,
            &to_write,
            &mut completions,
        )
        .await
        {
            if err.is_fatal() {
                fail_all(completions);
                return Err(err);
            }
        }
    }
}

fn fail_all(completions: HashMap<NonZeroStreamId, oneshot::Sender<Result<Response>>>) {
    for (_, respond_to) in completions {
        let _ = respond_to.send(Err(Error::Closed));
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_frame(
    frame: Frame,
    decoder: &mut Decoder,
    input: &mut InputChannel,
    streams: &mut HashMap<NonZeroStreamId, Stream>,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    role: &ReadRole,
    to_write: &mpsc::UnboundedSender<WriteCommand>,
    completions: &mut HashMap<NonZeroStreamId, oneshot::Sender<Result<Response>>>,
) -> Result<()> {
    let Frame { header, payload } = frame;
    let Some(frame_type) = FrameType::from_u8(header.type_byte) else {
        return Ok(()); // unknown type: read and discard, §3
    };

    match frame_type {
        FrameType::Settings => {
            let flags = SettingsFlags::from_bits_truncate(header.flags);
            if !flags.contains(SettingsFlags::ACK) {
                let mut w = writer.lock().await;
                Frame::write_raw(&mut *w, FrameType::Settings.byte(), SettingsFlags::ACK.bits(), 0, &[]).await?;
            }
            Ok(())
        }

        FrameType::WindowUpdate => {
            let increment = OutputChannel::parse_increment(&payload)?;
            to_write
                .send(WriteCommand::CreditWindow {
                    stream_id: header.stream,
                    increment,
                })
                .map_err(|_| Error::Closed)?;
            Ok(())
        }

        FrameType::GoAway => Err(Error::Closed),

        FrameType::Headers => {
            let stream_id =
                NonZeroStreamId::new(header.stream).ok_or(Error::StreamId("HEADERS on stream 0"))?;
            let hflags = HeadersFlags::from_bits_truncate(header.flags);
            let block = strip_headers_payload(&payload, hflags)?;

            let stream = streams.entry(stream_id).or_insert_with(|| Stream::new(stream_id));
            stream.header_block.extend_from_slice(block);

            if hflags.end_headers() {
                // §4.2/§3 invariant 5: the block may have straddled a
                // CONTINUATION boundary, so the whole accumulated sequence
                // is inflated in one pass now that it's complete.
                let full_block = std::mem::take(&mut stream.header_block);
                decoder.inflate(&full_block, |name, value| stream.headers.push((name, value)))?;
                stream.on_headers_received(hflags.end_stream());
                maybe_dispatch(stream_id, streams, role, to_write, completions);
            } else {
                stream.continuing = true;
                stream.no_body = hflags.end_stream();
            }
            Ok(())
        }

        FrameType::Continuation => {
            let stream_id = NonZeroStreamId::new(header.stream)
                .ok_or(Error::StreamId("CONTINUATION on stream 0"))?;
            let cflags = ContinuationFlags::from_bits_truncate(header.flags);
            let stream = streams
                .get_mut(&stream_id)
                .ok_or(Error::StreamId("CONTINUATION on unknown stream"))?;
            stream.header_block.extend_from_slice(&payload);

            if cflags.end_headers() {
                let full_block = std::mem::take(&mut stream.header_block);
                decoder.inflate(&full_block, |name, value| stream.headers.push((name, value)))?;
                stream.continuing = false;
                let end_stream = stream.no_body;
                stream.on_headers_received(end_stream);
                maybe_dispatch(stream_id, streams, role, to_write, completions);
            }
            Ok(())
        }

        FrameType::Data => {
            let stream_id =
                NonZeroStreamId::new(header.stream).ok_or(Error::StreamId("DATA on stream 0"))?;
            let dflags = DataFlags::from_bits_truncate(header.flags);
            let data = strip_data_payload(&payload, dflags)?;

            let stream = streams
                .get_mut(&stream_id)
                .ok_or(Error::StreamId("DATA on unknown stream"))?;
            {
                let mut w = writer.lock().await;
                input.append(&mut *w, stream, data, !dflags.end_stream()).await?;
            }
            stream.on_data_received(dflags.end_stream());

            if dflags.end_stream() {
                maybe_dispatch(stream_id, streams, role, to_write, completions);
            }
            Ok(())
        }

        // PRIORITY, RST_STREAM, PUSH_PROMISE, PING: out of scope (§1 Non-goals).
        _ => Ok(()),
    }
}

/// Once a stream has observed END_STREAM, hand the assembled request/response
/// off to the application: spawn the matching handler (server) or fire the
/// awaiting completion (client). Runs at most once per stream -- the table
/// removal below is what prevents a second dispatch, since a later frame on
/// the same id can only recreate a fresh, not-yet-half-closed entry.
fn maybe_dispatch(
    stream_id: NonZeroStreamId,
    streams: &mut HashMap<NonZeroStreamId, Stream>,
    role: &ReadRole,
    to_write: &mpsc::UnboundedSender<WriteCommand>,
    completions: &mut HashMap<NonZeroStreamId, oneshot::Sender<Result<Response>>>,
) {
    let ready = matches!(
        streams.get(&stream_id),
        Some(stream) if stream.is_half_closed_remote()
    );
    if !ready {
        return;
    }
    // §3 invariant 4: the stream's slot is released from the table exactly
    // once, right here, the moment it closes -- not left to grow the table
    // for the rest of the connection's life.
    let mut stream = streams.remove(&stream_id).expect("checked above");
    let headers = std::mem::take(&mut stream.headers);
    let body = InputChannel::extract(&mut stream);

    match role {
        ReadRole::Server(handlers) => {
            let path = header_value(&headers, ":path").unwrap_or("/").to_owned();
            let handler = handlers.find(&path);
            let to_write = to_write.clone();
            tokio::spawn(async move {
                let request = request_from_wire(headers, body);
                let mut response = match handler {
                    Some(handler) => handler(request).await,
                    None => Response::new(404, Vec::new(), Bytes::new()),
                };
                response.fill_default_server_header();
                let _ = to_write.send(WriteCommand::SendResponse { stream_id, response });
            });
        }
        ReadRole::Client => {
            if let Some(respond_to) = completions.remove(&stream_id) {
                let response = Response {
                    request_id: 0,
                    headers,
                    body,
                };
                let _ = respond_to.send(response.into_result());
            }
        }
    }
}

fn header_value<'a>(headers: &'a Headers, key: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn request_from_wire(headers: Headers, body: Bytes) -> Request {
    let scheme = header_value(&headers, ":scheme").unwrap_or("http");
    let authority = header_value(&headers, ":authority").unwrap_or("localhost");
    let path = header_value(&headers, ":path").unwrap_or("/");
    let url = url::Url::parse(&format!("{scheme}://{authority}{path}"))
        .unwrap_or_else(|_| url::Url::parse("http://localhost/").expect("static URL parses"));
    Request {
        id: 0,
        url,
        headers,
        body,
    }
}

fn strip_headers_payload(payload: &[u8], flags: HeadersFlags) -> Result<&[u8]> {
    let mut buf = payload;
    let mut pad_len = 0usize;
    if flags.contains(HeadersFlags::PADDED) {
        let (&len, rest) = buf
            .split_first()
            .ok_or(Error::MalformedFrame("PADDED HEADERS missing pad length"))?;
        pad_len = len as usize;
        buf = rest;
    }
    if flags.contains(HeadersFlags::PRIORITY) {
        if buf.len() < 5 {
            return Err(Error::MalformedFrame("PRIORITY HEADERS payload too short"));
        }
        buf = &buf[5..];
    }
    if pad_len > buf.len() {
        return Err(Error::MalformedFrame("HEADERS padding exceeds payload"));
    }
    Ok(&buf[..buf.len() - pad_len])
}

fn strip_data_payload(payload: &[u8], flags: DataFlags) -> Result<&[u8]> {
    if !flags.contains(DataFlags::PADDED) {
        return Ok(payload);
    }
    let (&pad_len, rest) = payload
        .split_first()
        .ok_or(Error::MalformedFrame("PADDED DATA missing pad length"))?;
    let pad_len = pad_len as usize;
    if pad_len > rest.len() {
        return Err(Error::MalformedFrame("DATA padding exceeds payload"));
    }
    Ok(&rest[..rest.len() - pad_len])
}

async fn run_write_loop(
    writer: Arc<Mutex<OwnedWriteHalf>>,
    mut cmd_rx: mpsc::UnboundedReceiver<WriteCommand>,
    read_cmd_tx: mpsc::UnboundedSender<ReadCommand>,
) -> Result<()> {
    let mut encoder = Encoder::new();
    let mut output = OutputChannel::new();
    let mut streams: HashMap<NonZeroStreamId, Stream> = HashMap::new();
    let mut next_stream_id: u32 = 1; // client streams only; unused on the server side
    let scheduler = WriteScheduler::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                handle_write_command(
                    cmd,
                    &writer,
                    &mut encoder,
                    &mut output,
                    &mut streams,
                    &mut next_stream_id,
                    &read_cmd_tx,
                    &scheduler,
                )
                .await?;
            }
            () = scheduler.wait() => {
                crate::runtime::coalesce().await;
                {
                    let mut w = writer.lock().await;
                    output.flush(&mut *w, &mut streams).await?;
                }
                if !output.is_idle() {
                    scheduler.wake();
                }
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_write_command(
    cmd: WriteCommand,
    writer: &Arc<Mutex<OwnedWriteHalf>>,
    encoder: &mut Encoder,
    output: &mut OutputChannel,
    streams: &mut HashMap<NonZeroStreamId, Stream>,
    next_stream_id: &mut u32,
    read_cmd_tx: &mpsc::UnboundedSender<ReadCommand>,
    scheduler: &WriteScheduler,
) -> Result<()> {
    match cmd {
        WriteCommand::Immediate {
            type_byte,
            flags,
            stream,
            payload,
        } => {
            let mut w = writer.lock().await;
            Frame::write_raw(&mut *w, type_byte, flags, stream, &payload).await?;
        }

        WriteCommand::CreditWindow {
            stream_id,
            increment,
        } => {
            output.apply_window_update(stream_id, increment, streams)?;
            scheduler.wake();
        }

        WriteCommand::SendResponse {
            stream_id,
            response,
        } => {
            let block = encoder.deflate(&response.headers);
            let end_stream = response.body.is_empty();
            let mut flags = HeadersFlags::END_HEADERS;
            if end_stream {
                flags |= HeadersFlags::END_STREAM;
            }
            {
                let mut w = writer.lock().await;
                Frame::write_raw(
                    &mut *w,
                    FrameType::Headers.byte(),
                    flags.bits(),
                    stream_id.get(),
                    &block,
                )
                .await?;
            }
            if !end_stream {
                streams.entry(stream_id).or_insert_with(|| Stream::new(stream_id));
                output.enqueue(stream_id, response.body);
                scheduler.wake();
            }
        }

        WriteCommand::SendRequest {
            request,
            respond_to,
        } => {
            if *next_stream_id > U31_MAX.get() {
                let _ = respond_to.send(Err(Error::StreamId("stream id space exhausted")));
                return Err(Error::StreamId("stream id space exhausted"));
            }
            let stream_id = NonZeroU32::new(*next_stream_id).expect("checked above to be nonzero");
            *next_stream_id += 2;

            let block = encoder.deflate(&request.headers);
            let end_stream = request.body.is_empty();
            let mut flags = HeadersFlags::END_HEADERS;
            if end_stream {
                flags |= HeadersFlags::END_STREAM;
            }
            {
                let mut w = writer.lock().await;
                Frame::write_raw(
                    &mut *w,
                    FrameType::Headers.byte(),
                    flags.bits(),
                    stream_id.get(),
                    &block,
                )
                .await?;
            }
            if !end_stream {
                // Only streams with a queued body need send-side bookkeeping
                // (§3 invariant 4: no slot held for a stream that's already
                // half-closed-local the moment HEADERS went out).
                streams.insert(stream_id, Stream::new(stream_id));
                output.enqueue(stream_id, request.body.clone());
                scheduler.wake();
            }
            let _ = read_cmd_tx.send(ReadCommand::Register {
                stream_id,
                respond_to,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_table_matches_longest_registered_prefix_first_match() {
        let mut table = HandlerTable::default();
        table.register("/api", Arc::new(|_| Box::pin(async { Response::new(200, Vec::new(), Bytes::new()) }) as HandlerFuture));
        assert!(table.find("/api/widgets").is_some());
        assert!(table.find("/other").is_none());
    }

    #[test]
    fn strip_headers_payload_removes_padding() {
        let payload = [3u8, b'a', b'b', 0, 0, 0]; // pad_len=3, 2 content bytes, 3 pad bytes
        let stripped = strip_headers_payload(&payload, HeadersFlags::PADDED).unwrap();
        assert_eq!(stripped, b"ab");
    }

    #[test]
    fn strip_data_payload_removes_padding() {
        let payload = [2u8, 1, 2, 3, 0, 0];
        let stripped = strip_data_payload(&payload, DataFlags::PADDED).unwrap();
        assert_eq!(stripped, &[1, 2, 3]);
    }

    #[test]
    fn request_from_wire_reconstructs_url_and_headers() {
        let headers: Headers = vec![
            (":method".to_owned(), "GET".to_owned()),
            (":scheme".to_owned(), "http".to_owned()),
            (":authority".to_owned(), "example.test".to_owned()),
            (":path".to_owned(), "/widgets".to_owned()),
        ];
        let request = request_from_wire(headers, Bytes::new());
        assert_eq!(request.url.as_str(), "http://example.test/widgets");
        assert_eq!(request.method(), "GET");
    }
}
