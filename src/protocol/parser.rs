//! Streaming RESP Parser
//!
//! This module decodes a live byte stream into discrete [`Payload`]s without
//! knowing message boundaries in advance. One parser task runs per
//! connection and hands each decoded unit to its consumer over a
//! single-slot channel, so at most one unit is ever in flight.
//!
//! ## How the Parser Works
//!
//! ```text
//!   AwaitingHeader ──'*'──> CollectingElements(N) ──N args──> Complete
//!         │                                                     ▲
//!         ├──────'$'──> CollectingBulkBody ─────────────────────┤
//!         │                                                     │
//!         └──'+' '-' ':'──(decoded immediately)─────────────────┘
//! ```
//!
//! Header lines are read up to `\n` and must end in `\r\n`. Bulk bodies are
//! read as an exact byte count plus the two-byte terminator, never delimited
//! by content, so embedded CR, LF and NUL bytes survive untouched.
//!
//! ## Error Recovery
//!
//! Transport failures (end of stream, read errors) end the sequence: one
//! final [`Payload::Error`] is emitted and the channel closes. Format
//! failures emit a [`Payload::Error`], reset the state and carry on with the
//! next line. That resynchronization is only reliable at message
//! boundaries; a format error in the middle of a multi-bulk leaves its
//! remaining elements to be read as fresh messages.

use crate::protocol::types::{prefix, Reply, CRLF};
use bytes::Bytes;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, trace};

/// Errors that can occur during stream parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The peer closed the stream at a message boundary
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a line or body
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Reading from the stream failed
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// Bad terminator, non-numeric length or invalid negative sentinel
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A bulk length above [`MAX_BULK_SIZE`]
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u64, max: u64 },
}

impl ParseError {
    /// Returns true for failures that end the stream.
    ///
    /// Anything else is a format failure local to one message.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ParseError::ConnectionClosed | ParseError::UnexpectedEof | ParseError::Io(_)
        )
    }

    fn protocol(raw: &[u8]) -> Self {
        let raw = raw.strip_suffix(CRLF).unwrap_or(raw);
        let shown = &raw[..raw.len().min(MAX_ERROR_CONTEXT)];
        ParseError::Protocol(shown.escape_ascii().to_string())
    }
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ParseError::UnexpectedEof
        } else {
            ParseError::Io(err)
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: u64 = 512 * 1024 * 1024;

/// How many bytes of the offending input a protocol error echoes back
const MAX_ERROR_CONTEXT: usize = 128;

/// Upper bound on the argument vector reserved from an untrusted count
const MAX_PREALLOCATED_ARGS: usize = 1024;

/// One decoded unit of the stream.
#[derive(Debug)]
pub enum Payload {
    /// A complete message
    Reply(Reply),
    /// A transport or format failure
    Error(ParseError),
    /// A single line with an unknown type byte; carries neither data nor error
    Unrecognized(Bytes),
}

/// Per-connection parse state, owned by the parser task.
///
/// Reset to its default after every completed message and after every
/// format error.
#[derive(Debug, Default)]
struct ReadState {
    reading_multi_line: bool,
    expected_args_count: usize,
    msg_type: u8,
    args: Vec<Bytes>,
    /// Size of the body the next read must consume, if one is pending
    bulk_len: Option<usize>,
}

impl ReadState {
    fn finished(&self) -> bool {
        self.expected_args_count > 0 && self.args.len() == self.expected_args_count
    }
}

/// What a single read produced.
enum Line {
    /// A CRLF-terminated header line, terminator included
    Text(Vec<u8>),
    /// A bulk body with its terminator already stripped
    Body(Bytes),
}

/// Starts a parser task over `reader` and returns its output sequence.
///
/// The channel holds at most one payload, so the parser suspends until the
/// consumer has taken the previous one. The sequence ends after a transport
/// error, when the receiver is dropped, or if the task panics; a panic is
/// logged and never escapes the task.
pub fn parse_stream<R>(reader: R) -> mpsc::Receiver<Payload>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let parser = StreamParser::new(reader, tx);
        if let Err(panic) = AssertUnwindSafe(parser.run()).catch_unwind().await {
            error!(panic = panic_message(panic.as_ref()), "Parser task panicked");
        }
    });

    rx
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic payload"
    }
}

struct StreamParser<R> {
    reader: BufReader<R>,
    state: ReadState,
    tx: mpsc::Sender<Payload>,
}

impl<R: AsyncRead + Unpin> StreamParser<R> {
    fn new(reader: R, tx: mpsc::Sender<Payload>) -> Self {
        Self {
            reader: BufReader::new(reader),
            state: ReadState::default(),
            tx,
        }
    }

    async fn run(mut self) {
        loop {
            let result = match self.read_line().await {
                Ok(line) => self.process(line),
                Err(e) if e.is_transport() => {
                    trace!(error = %e, "Parser stopping");
                    let _ = self.tx.send(Payload::Error(e)).await;
                    return;
                }
                Err(e) => Err(e),
            };

            let payload = match result {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => Payload::Error(e),
            };

            self.state = ReadState::default();
            if self.tx.send(payload).await.is_err() {
                // Consumer is gone
                return;
            }
        }
    }

    /// Reads either a header line or, when a body is pending, exactly
    /// `bulk_len + 2` bytes.
    async fn read_line(&mut self) -> ParseResult<Line> {
        match self.state.bulk_len.take() {
            None => {
                let mut line = Vec::new();
                let n = self.reader.read_until(b'\n', &mut line).await?;
                if n == 0 {
                    return Err(ParseError::ConnectionClosed);
                }
                if line.last() != Some(&b'\n') {
                    return Err(ParseError::UnexpectedEof);
                }
                if !line.ends_with(CRLF) {
                    return Err(ParseError::protocol(&line));
                }
                Ok(Line::Text(line))
            }
            Some(len) => {
                let mut body = vec![0u8; len + 2];
                self.reader.read_exact(&mut body).await?;
                if !body.ends_with(CRLF) {
                    return Err(ParseError::protocol(&body));
                }
                body.truncate(len);
                Ok(Line::Body(Bytes::from(body)))
            }
        }
    }

    fn process(&mut self, line: Line) -> ParseResult<Option<Payload>> {
        if self.state.reading_multi_line {
            return self.read_body(line);
        }

        let line = match line {
            Line::Text(line) => line,
            // Bodies are only ever pending mid-message
            Line::Body(body) => return Ok(Some(Payload::Unrecognized(body))),
        };

        match line.first() {
            Some(&prefix::MULTI_BULK) => {
                self.parse_multi_bulk_header(&line)?;
                if self.state.expected_args_count == 0 {
                    return Ok(Some(Payload::Reply(Reply::EmptyMultiBulk)));
                }
                Ok(None)
            }
            Some(&prefix::BULK) => {
                self.parse_bulk_header(&line)?;
                if !self.state.reading_multi_line {
                    return Ok(Some(Payload::Reply(Reply::NullBulk)));
                }
                Ok(None)
            }
            _ => parse_single_line(&line).map(Some),
        }
    }

    fn parse_multi_bulk_header(&mut self, line: &[u8]) -> ParseResult<()> {
        let count: u32 = parse_number(line)?;
        if count == 0 {
            return Ok(());
        }

        let count = count as usize;
        self.state.msg_type = prefix::MULTI_BULK;
        self.state.reading_multi_line = true;
        self.state.expected_args_count = count;
        self.state.args = Vec::with_capacity(count.min(MAX_PREALLOCATED_ARGS));
        Ok(())
    }

    fn parse_bulk_header(&mut self, line: &[u8]) -> ParseResult<()> {
        let len: i64 = parse_number(line)?;
        if len == -1 {
            return Ok(());
        }
        if len < -1 {
            return Err(ParseError::protocol(line));
        }

        self.state.msg_type = prefix::BULK;
        self.state.reading_multi_line = true;
        self.state.expected_args_count = 1;
        self.state.args = Vec::with_capacity(1);
        self.state.bulk_len = Some(checked_bulk_len(len)?);
        Ok(())
    }

    fn read_body(&mut self, line: Line) -> ParseResult<Option<Payload>> {
        match line {
            Line::Body(body) => self.state.args.push(body),
            Line::Text(text) => {
                let content = &text[..text.len() - CRLF.len()];
                if content.first() == Some(&prefix::BULK) {
                    let len: i64 = parse_number(&text)?;
                    if len < 0 {
                        // Null element
                        self.state.args.push(Bytes::new());
                    } else {
                        self.state.bulk_len = Some(checked_bulk_len(len)?);
                    }
                } else {
                    self.state.args.push(Bytes::copy_from_slice(content));
                }
            }
        }

        if !self.state.finished() {
            return Ok(None);
        }

        let args = std::mem::take(&mut self.state.args);
        let reply = if self.state.msg_type == prefix::MULTI_BULK {
            Reply::MultiBulk(args)
        } else {
            Reply::Bulk(args.into_iter().next().unwrap_or_default())
        };
        Ok(Some(Payload::Reply(reply)))
    }
}

/// Decodes a `+`, `-` or `:` line. Unknown type bytes yield
/// [`Payload::Unrecognized`].
fn parse_single_line(line: &[u8]) -> ParseResult<Payload> {
    let raw = &line[..line.len() - CRLF.len()];
    let reply = match raw.split_first() {
        Some((&prefix::STATUS, text)) => Reply::Status(String::from_utf8_lossy(text).into_owned()),
        Some((&prefix::ERROR, text)) => Reply::Error(String::from_utf8_lossy(text).into_owned()),
        Some((&prefix::INTEGER, _)) => Reply::Integer(parse_number(line)?),
        // Covers the bare CRLF line too
        _ => return Ok(Payload::Unrecognized(Bytes::copy_from_slice(raw))),
    };
    Ok(Payload::Reply(reply))
}

/// Parses the decimal between the type byte and the CRLF.
fn parse_number<T: FromStr>(line: &[u8]) -> ParseResult<T> {
    let digits = &line[1..line.len() - CRLF.len()];
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::protocol(line))
}

fn checked_bulk_len(len: i64) -> ParseResult<usize> {
    let size = len as u64;
    if size > MAX_BULK_SIZE {
        return Err(ParseError::MessageTooLarge {
            size,
            max: MAX_BULK_SIZE,
        });
    }
    Ok(size as usize)
}
