//! Streaming RESP Decoder
//!
//! This module turns a raw byte stream into a sequence of [`Reply`] values.
//! Network reads are not aligned to frame boundaries, so the decoder never
//! looks at "what arrived in this read". It pulls whole lines (or whole
//! fixed-length bulk payloads) from a buffered reader and feeds them to a
//! small line-driven state machine.
//!
//! ## How the Decoder Works
//!
//! ```text
//!            ┌────────────────────────┐
//!            │  read line / payload   │◄─────────────────┐
//!            └───────────┬────────────┘                  │
//!                        │                               │
//!          ┌─────────────┴─────────────┐                 │
//!          │ inside a multi-line frame?│                 │
//!          └──────┬─────────────┬──────┘                 │
//!              no │             │ yes                    │
//!                 ▼             ▼                        │
//!        ┌──────────────┐ ┌──────────────┐               │
//!        │ header: * $  │ │ body: $len   │── not done ───┘
//!        │ single line  │ │ or argument  │
//!        └──────┬───────┘ └──────┬───────┘
//!               │ frame done     │ frame done
//!               ▼                ▼
//!            emit Payload, reset state
//! ```
//!
//! Every decode cycle yields one [`Payload`]:
//! - `Ok(reply)` - a complete frame
//! - `Err(ParseError::Protocol(_))` - a malformed frame; the state is reset
//!   and decoding carries on with the next line
//! - `Err(ParseError::Io(_))` - the stream failed or ended; nothing more
//!   will be produced
//!
//! ## Entry Points
//!
//! - [`parse_stream`] spawns a decode task and hands Payloads over a channel
//! - [`Decoder`] drives the same state machine inline, without a task
//! - [`parse_one`] decodes a single frame out of an in-memory buffer

use crate::protocol::reply::{prefix, Reply, CRLF};
use bytes::Bytes;
use std::any::Any;
use std::io::{self, BufRead};
use std::str::FromStr;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{error, trace};

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum length of a header or inline line (64 KB)
pub const MAX_LINE_SIZE: usize = 64 * 1024;

/// Upper bound on the argument slots reserved up front for a `*<n>` header.
const MAX_PREALLOC_ARGS: usize = 1024;

/// Errors produced while decoding.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Malformed frame. Carries the offending line, escaped.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying reader failed or reached end of stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Single-shot decode over an empty buffer
    #[error("no reply")]
    NoReply,
}

impl ParseError {
    fn protocol(line: &[u8]) -> Self {
        ParseError::Protocol(line.escape_ascii().to_string())
    }

    /// Returns true for errors that end the decode sequence.
    pub fn is_io(&self) -> bool {
        matches!(self, ParseError::Io(_))
    }
}

/// Result of one decode cycle.
pub type Payload = Result<Reply, ParseError>;

/// What the state machine needs next from the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Read {
    /// A `\n`-terminated line
    Line,
    /// Exactly this many bytes (bulk payload plus its CRLF)
    Exact(usize),
}

/// Per-frame decode state. Reset to default whenever a frame completes or
/// fails, so nothing leaks into the next frame.
#[derive(Debug, Default)]
struct ReadState {
    reading_multi_line: bool,
    expected_args: usize,
    msg_type: u8,
    args: Vec<Option<Bytes>>,
    /// Length of the bulk payload to read next, if any.
    bulk_len: Option<usize>,
}

impl ReadState {
    fn next_read(&self) -> Read {
        match self.bulk_len {
            Some(len) => Read::Exact(len + 2),
            None => Read::Line,
        }
    }

    fn finished(&self) -> bool {
        self.expected_args > 0 && self.args.len() == self.expected_args
    }

    fn reset(&mut self) {
        *self = ReadState::default();
    }

    fn fail(&mut self, msg: &[u8]) -> Payload {
        self.reset();
        Err(ParseError::protocol(msg))
    }

    /// Feeds one unit of input: a full line, or a bulk payload with its CRLF.
    ///
    /// Returns a Payload once a frame is complete or found to be malformed.
    fn feed(&mut self, msg: Bytes) -> Option<Payload> {
        let fixed = self.bulk_len.take().is_some();

        if !msg.ends_with(CRLF) {
            return Some(self.fail(&msg));
        }
        let line = msg.slice(..msg.len() - 2);

        if fixed {
            // Binary-safe payload: taken verbatim, whatever it starts with
            self.args.push(Some(line));
            return self.complete();
        }

        if !self.reading_multi_line {
            return self.dispatch_header(&msg, line);
        }

        self.read_body(&msg, line)
    }

    fn dispatch_header(&mut self, msg: &[u8], line: Bytes) -> Option<Payload> {
        match line.first() {
            Some(&prefix::ARRAY) => {
                let count: u32 = match parse_length(&line[1..]) {
                    Some(n) => n,
                    None => return Some(self.fail(msg)),
                };
                if count == 0 {
                    self.reset();
                    return Some(Ok(Reply::EmptyMultiBulk));
                }
                let count = count as usize;
                self.reading_multi_line = true;
                self.expected_args = count;
                self.msg_type = prefix::ARRAY;
                self.args = Vec::with_capacity(count.min(MAX_PREALLOC_ARGS));
                None
            }
            Some(&prefix::BULK) => {
                let len: i64 = match parse_length(&line[1..]) {
                    Some(n) => n,
                    None => return Some(self.fail(msg)),
                };
                if len == -1 {
                    self.reset();
                    return Some(Ok(Reply::NullBulk));
                }
                match bulk_len(len) {
                    Some(len) => {
                        self.reading_multi_line = true;
                        self.expected_args = 1;
                        self.msg_type = prefix::BULK;
                        self.args = Vec::with_capacity(1);
                        self.bulk_len = Some(len);
                        None
                    }
                    None => Some(self.fail(msg)),
                }
            }
            _ => {
                let result = parse_single_line(msg, line);
                self.reset();
                Some(result)
            }
        }
    }

    fn read_body(&mut self, msg: &[u8], line: Bytes) -> Option<Payload> {
        if line.first() == Some(&prefix::BULK) {
            let len: i64 = match parse_length(&line[1..]) {
                Some(n) => n,
                None => return Some(self.fail(msg)),
            };
            if len == -1 {
                self.args.push(None);
            } else {
                match bulk_len(len) {
                    Some(len) => self.bulk_len = Some(len),
                    None => return Some(self.fail(msg)),
                }
            }
        } else {
            self.args.push(Some(line));
        }
        self.complete()
    }

    fn complete(&mut self) -> Option<Payload> {
        if !self.finished() {
            return None;
        }
        let mut state = std::mem::take(self);
        let reply = if state.msg_type == prefix::ARRAY {
            Reply::MultiBulk(state.args)
        } else {
            match state.args.pop() {
                Some(Some(data)) => Reply::Bulk(data),
                _ => Reply::NullBulk,
            }
        };
        Some(Ok(reply))
    }
}

/// Validates a declared bulk length.
fn bulk_len(len: i64) -> Option<usize> {
    usize::try_from(len).ok().filter(|&len| len <= MAX_BULK_SIZE)
}

fn parse_number<T: FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Parses the count or length of an array or bulk header. Unlike integer
/// replies, an explicit `+` sign is not allowed here.
fn parse_length<T: FromStr>(digits: &[u8]) -> Option<T> {
    if digits.first() == Some(&b'+') {
        return None;
    }
    parse_number(digits)
}

/// Parses a line that is a whole frame by itself: status, error, integer,
/// or an inline command.
fn parse_single_line(msg: &[u8], line: Bytes) -> Payload {
    match line.first() {
        Some(&prefix::STATUS) => Ok(Reply::Status(
            String::from_utf8_lossy(&line[1..]).into_owned(),
        )),
        Some(&prefix::ERROR) => Ok(Reply::Error(
            String::from_utf8_lossy(&line[1..]).into_owned(),
        )),
        Some(&prefix::INTEGER) => parse_number(&line[1..])
            .map(Reply::Integer)
            .ok_or_else(|| ParseError::protocol(msg)),
        _ => {
            // Inline command: space separated words, e.g. `PING\r\n`
            let mut args = Vec::new();
            let mut start = 0;
            for (i, &b) in line.iter().enumerate() {
                if b == b' ' {
                    args.push(Some(line.slice(start..i)));
                    start = i + 1;
                }
            }
            args.push(Some(line.slice(start..)));
            Ok(Reply::MultiBulk(args))
        }
    }
}

fn end_of_stream() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")
}

/// Decodes Payloads from a buffered async reader.
///
/// This is the decoder without a task around it. Each call to
/// [`Decoder::next_payload`] reads as much as one frame needs.
///
/// # Example
///
/// ```ignore
/// use flashresp::protocol::Decoder;
/// use tokio::io::BufReader;
///
/// let mut decoder = Decoder::new(BufReader::new(read_half));
/// loop {
///     match decoder.next_payload().await {
///         Ok(reply) => println!("{}", reply),
///         Err(e) if e.is_io() => break,
///         Err(e) => eprintln!("{}", e),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Decoder<R> {
    reader: R,
    state: ReadState,
}

impl<R> Decoder<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ReadState::default(),
        }
    }

    /// Reads until one frame completes or fails.
    ///
    /// An `Err(ParseError::Io(_))` is terminal; calling again after it is
    /// allowed but will only see whatever the reader does next.
    pub async fn next_payload(&mut self) -> Payload {
        loop {
            let msg = match self.read_next().await {
                Ok(msg) => msg,
                Err(e) => {
                    if !e.is_io() {
                        self.state.reset();
                    }
                    return Err(e);
                }
            };
            if let Some(payload) = self.state.feed(msg) {
                return payload;
            }
        }
    }

    async fn read_next(&mut self) -> Result<Bytes, ParseError> {
        match self.state.next_read() {
            Read::Line => {
                let mut line = Vec::new();
                let mut limited = AsyncReadExt::take(&mut self.reader, MAX_LINE_SIZE as u64);
                let n = limited.read_until(b'\n', &mut line).await?;
                let result = check_line(n, line);
                if matches!(result, Err(ParseError::Protocol(_))) {
                    self.skip_line().await?;
                }
                result
            }
            Read::Exact(len) => {
                let mut buf = vec![0u8; len];
                AsyncReadExt::read_exact(&mut self.reader, &mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// Discards input up to and including the next `\n`, one buffered
    /// chunk at a time. Stops quietly at end of stream.
    async fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                return Ok(());
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(());
                }
                None => {
                    let len = buf.len();
                    self.reader.consume(len);
                }
            }
        }
    }
}

fn check_line(n: usize, line: Vec<u8>) -> Result<Bytes, ParseError> {
    if line.last() == Some(&b'\n') {
        return Ok(Bytes::from(line));
    }
    if n >= MAX_LINE_SIZE {
        return Err(ParseError::Protocol(format!(
            "line exceeds {} bytes",
            MAX_LINE_SIZE
        )));
    }
    Err(end_of_stream().into())
}

/// Handle to a running decode task.
///
/// Yields Payloads in the order frames complete on the stream. Dropping the
/// handle stops the task and releases the reader.
#[derive(Debug)]
pub struct PayloadStream {
    rx: mpsc::Receiver<Payload>,
    task: AbortHandle,
}

impl PayloadStream {
    /// Waits for the next Payload. `None` once the sequence has ended.
    pub async fn next(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a task that decodes `reader` and returns a handle to its output.
///
/// The sequence ends after the first I/O error (end of stream included),
/// which is always delivered as the last Payload. A panic inside the decode
/// task ends the sequence without a final Payload. The supervisor logs the
/// panic message; the stack trace is written by the process panic hook
/// (with `RUST_BACKTRACE=1` under the default hook).
///
/// Must be called from within a Tokio runtime.
pub fn parse_stream<R>(reader: R) -> PayloadStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    // Capacity 1: the decoder cannot run ahead of its consumer
    let (tx, rx) = mpsc::channel(1);
    let decoder = Decoder::new(BufReader::new(reader));

    let decode = tokio::spawn(decode_loop(decoder, tx));
    let task = decode.abort_handle();

    tokio::spawn(async move {
        if let Err(e) = decode.await {
            if e.is_panic() {
                error!(
                    panic = %panic_message(e.into_panic()),
                    "Decoder task panicked, abandoning stream"
                );
            }
        }
    });

    PayloadStream { rx, task }
}

async fn decode_loop<R>(mut decoder: Decoder<R>, tx: mpsc::Sender<Payload>)
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let payload = decoder.next_payload().await;
        let terminal = matches!(&payload, Err(e) if e.is_io());

        if tx.send(payload).await.is_err() {
            trace!("Payload receiver dropped, stopping decoder");
            return;
        }
        if terminal {
            return;
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Decodes the first frame in `data`.
///
/// Returns whatever the first decode cycle produces, protocol errors
/// included. Fails with [`ParseError::NoReply`] on empty input.
///
/// # Example
/// ```
/// use flashresp::protocol::{parse_one, Reply};
///
/// let reply = parse_one(b"*1\r\n$4\r\nPING\r\n").unwrap();
/// assert_eq!(reply, Reply::multi_bulk(["PING"]));
/// ```
pub fn parse_one(data: &[u8]) -> Payload {
    if data.is_empty() {
        return Err(ParseError::NoReply);
    }

    let mut reader = data;
    let mut state = ReadState::default();
    loop {
        let msg = match state.next_read() {
            Read::Line => {
                let mut line = Vec::new();
                let mut limited = io::Read::take(&mut reader, MAX_LINE_SIZE as u64);
                let n = BufRead::read_until(&mut limited, b'\n', &mut line)?;
                check_line(n, line)?
            }
            Read::Exact(len) => {
                let mut buf = vec![0u8; len];
                io::Read::read_exact(&mut reader, &mut buf)?;
                Bytes::from(buf)
            }
        };
        if let Some(payload) = state.feed(msg) {
            return payload;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio_test::io::Builder;

    fn args(reply: &Reply) -> Vec<&[u8]> {
        reply
            .as_args()
            .unwrap()
            .iter()
            .map(|a| a.as_deref().unwrap())
            .collect()
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_one(b"+OK\r\n").unwrap(), Reply::status("OK"));
    }

    #[test]
    fn test_parse_error() {
        let reply = parse_one(b"-ERR unknown command\r\n").unwrap();
        assert_eq!(reply.error_message(), Some("ERR unknown command"));
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_one(b":1000\r\n").unwrap(), Reply::integer(1000));
        assert_eq!(parse_one(b":-42\r\n").unwrap(), Reply::integer(-42));
    }

    #[test]
    fn test_parse_invalid_integer() {
        let err = parse_one(b":not_a_number\r\n").unwrap_err();
        match err {
            ParseError::Protocol(line) => assert!(line.contains("not_a_number")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_bulk() {
        assert_eq!(parse_one(b"$5\r\nhello\r\n").unwrap(), Reply::bulk("hello"));
    }

    #[test]
    fn test_parse_null_bulk() {
        assert_eq!(parse_one(b"$-1\r\n").unwrap(), Reply::NullBulk);
    }

    #[test]
    fn test_parse_empty_bulk() {
        assert_eq!(parse_one(b"$0\r\n\r\n").unwrap(), Reply::bulk(Bytes::new()));
    }

    #[test]
    fn test_parse_empty_multi_bulk() {
        assert_eq!(parse_one(b"*0\r\n").unwrap(), Reply::EmptyMultiBulk);
    }

    #[test]
    fn test_parse_multi_bulk() {
        let reply = parse_one(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n").unwrap();
        assert_eq!(args(&reply), vec![&b"GET"[..], b"name"]);
    }

    #[test]
    fn test_parse_ping_frame() {
        let reply = parse_one(b"*1\r\n$4\r\nPING\r\n").unwrap();
        assert_eq!(reply, Reply::multi_bulk(["PING"]));
    }

    #[test]
    fn test_binary_safe_bulk() {
        let reply = parse_one(b"$6\r\na\r\nb\nc\r\n").unwrap();
        assert_eq!(reply, Reply::bulk(Bytes::from_static(b"a\r\nb\nc")));

        let reply = parse_one(b"*1\r\n$5\r\nhel\x00o\r\n").unwrap();
        assert_eq!(args(&reply), vec![&b"hel\x00o"[..]]);
    }

    #[test]
    fn test_bulk_payload_starting_with_dollar() {
        let reply = parse_one(b"*2\r\n$3\r\n$10\r\n$1\r\nx\r\n").unwrap();
        assert_eq!(args(&reply), vec![&b"$10"[..], b"x"]);
    }

    #[test]
    fn test_nested_null_and_empty_arguments() {
        let reply = parse_one(b"*3\r\n$-1\r\n$0\r\n\r\n$1\r\na\r\n").unwrap();
        assert_eq!(
            reply,
            Reply::MultiBulk(vec![None, Some(Bytes::new()), Some(Bytes::from("a"))])
        );
    }

    #[test]
    fn test_parse_inline_command() {
        let reply = parse_one(b"SET key value\r\n").unwrap();
        assert_eq!(reply, Reply::multi_bulk(["SET", "key", "value"]));
    }

    #[test]
    fn test_missing_cr_is_protocol_error() {
        assert!(matches!(
            parse_one(b"+OK\n"),
            Err(ParseError::Protocol(_))
        ));
        assert!(matches!(parse_one(b"\n"), Err(ParseError::Protocol(_))));
    }

    #[test]
    fn test_bad_headers() {
        assert!(matches!(parse_one(b"*abc\r\n"), Err(ParseError::Protocol(_))));
        assert!(matches!(parse_one(b"*-1\r\n"), Err(ParseError::Protocol(_))));
        assert!(matches!(parse_one(b"$x\r\n"), Err(ParseError::Protocol(_))));
        assert!(matches!(parse_one(b"$-2\r\n"), Err(ParseError::Protocol(_))));
    }

    #[test]
    fn test_signed_header_lengths_rejected() {
        assert!(matches!(
            parse_one(b"*+1\r\n$4\r\nPING\r\n"),
            Err(ParseError::Protocol(_))
        ));
        assert!(matches!(
            parse_one(b"$+3\r\nfoo\r\n"),
            Err(ParseError::Protocol(_))
        ));
        assert!(matches!(
            parse_one(b"*1\r\n$+3\r\nfoo\r\n"),
            Err(ParseError::Protocol(_))
        ));
        // Integer replies keep accepting an explicit sign
        assert_eq!(parse_one(b":+5\r\n").unwrap(), Reply::integer(5));
    }

    #[test]
    fn test_bulk_payload_without_crlf() {
        assert!(matches!(
            parse_one(b"$3\r\nabcde"),
            Err(ParseError::Protocol(_))
        ));
    }

    #[test]
    fn test_oversized_bulk_rejected() {
        let input = format!("${}\r\n", MAX_BULK_SIZE + 1);
        assert!(matches!(
            parse_one(input.as_bytes()),
            Err(ParseError::Protocol(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(parse_one(b""), Err(ParseError::NoReply)));
    }

    #[test]
    fn test_truncated_input_is_io_error() {
        let err = parse_one(b"*2\r\n$3\r\nGET\r\n").unwrap_err();
        assert!(err.is_io());

        let err = parse_one(b"$5\r\nhel").unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_roundtrip() {
        let original = Reply::multi_bulk(["SET", "k", "v"]);
        let parsed = parse_one(&original.encode()).unwrap();
        assert_eq!(parsed, original);
    }

    #[tokio::test]
    async fn test_decoder_split_reads() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r")
            .read(b"\nPI")
            .read(b"NG\r\n")
            .build();
        let mut decoder = Decoder::new(BufReader::new(mock));

        assert_eq!(
            decoder.next_payload().await.unwrap(),
            Reply::multi_bulk(["PING"])
        );
        assert!(decoder.next_payload().await.unwrap_err().is_io());
    }

    #[tokio::test]
    async fn test_decoder_binary_payload_split_across_reads() {
        let mock = Builder::new()
            .read(b"$4\r\na\r")
            .read(b"\nb\r\n")
            .build();
        let mut decoder = Decoder::new(BufReader::new(mock));

        assert_eq!(
            decoder.next_payload().await.unwrap(),
            Reply::bulk(Bytes::from_static(b"a\r\nb"))
        );
    }

    #[tokio::test]
    async fn test_decoder_recovers_after_protocol_error() {
        let mock = Builder::new()
            .read(b"*x\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .build();
        let mut decoder = Decoder::new(BufReader::new(mock));

        assert!(matches!(
            decoder.next_payload().await,
            Err(ParseError::Protocol(_))
        ));
        assert_eq!(
            decoder.next_payload().await.unwrap(),
            Reply::multi_bulk(["GET", "k"])
        );
    }

    #[tokio::test]
    async fn test_decoder_reset_mid_frame() {
        // Second element header is garbage; the frame is dropped entirely
        let mock = Builder::new()
            .read(b"*2\r\n$1\r\na\r\n$zz\r\n+OK\r\n")
            .build();
        let mut decoder = Decoder::new(BufReader::new(mock));

        assert!(matches!(
            decoder.next_payload().await,
            Err(ParseError::Protocol(_))
        ));
        assert_eq!(decoder.next_payload().await.unwrap(), Reply::status("OK"));
    }

    #[tokio::test]
    async fn test_null_frames_consume_single_line() {
        let mock = Builder::new().read(b"$-1\r\n*0\r\n:7\r\n").build();
        let mut decoder = Decoder::new(BufReader::new(mock));

        assert_eq!(decoder.next_payload().await.unwrap(), Reply::NullBulk);
        assert_eq!(decoder.next_payload().await.unwrap(), Reply::EmptyMultiBulk);
        assert_eq!(decoder.next_payload().await.unwrap(), Reply::integer(7));
    }

    #[tokio::test]
    async fn test_overlong_line() {
        let mut input = vec![b'a'; MAX_LINE_SIZE + 10];
        input.extend_from_slice(b"\r\n");
        let mut decoder = Decoder::new(BufReader::new(&input[..]));

        assert!(matches!(
            decoder.next_payload().await,
            Err(ParseError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_overlong_line_tail_is_discarded() {
        let mut input = vec![b'x'; MAX_LINE_SIZE];
        input.extend_from_slice(b" FLUSHALL\r\n*1\r\n$4\r\nPING\r\n");
        let mut decoder = Decoder::new(BufReader::new(&input[..]));

        assert!(matches!(
            decoder.next_payload().await,
            Err(ParseError::Protocol(_))
        ));
        assert_eq!(
            decoder.next_payload().await.unwrap(),
            Reply::multi_bulk(["PING"])
        );
        assert!(decoder.next_payload().await.unwrap_err().is_io());
    }

    #[tokio::test]
    async fn test_overlong_line_tail_split_across_reads() {
        let head = vec![b'y'; MAX_LINE_SIZE + 100];
        let mock = Builder::new()
            .read(&head)
            .read(b"yyyy SET k v")
            .read(b"\r\n+OK\r\n")
            .build();
        let mut decoder = Decoder::new(BufReader::new(mock));

        assert!(matches!(
            decoder.next_payload().await,
            Err(ParseError::Protocol(_))
        ));
        assert_eq!(decoder.next_payload().await.unwrap(), Reply::status("OK"));
    }

    #[tokio::test]
    async fn test_overlong_line_inside_frame_drops_frame() {
        let mut input = b"*2\r\n$3\r\nGET\r\n".to_vec();
        input.extend(std::iter::repeat(b'z').take(MAX_LINE_SIZE + 1));
        input.extend_from_slice(b"\r\n:5\r\n");
        let mut decoder = Decoder::new(BufReader::new(&input[..]));

        assert!(matches!(
            decoder.next_payload().await,
            Err(ParseError::Protocol(_))
        ));
        assert_eq!(decoder.next_payload().await.unwrap(), Reply::integer(5));
    }

    #[tokio::test]
    async fn test_parse_stream_in_order() {
        let mut input = Vec::new();
        for i in 0..50 {
            input.extend_from_slice(&Reply::multi_bulk([format!("cmd{}", i)]).encode());
        }
        let mut stream = parse_stream(std::io::Cursor::new(input));

        for i in 0..50 {
            let reply = stream.next().await.unwrap().unwrap();
            assert_eq!(reply, Reply::multi_bulk([format!("cmd{}", i)]));
        }
        assert!(stream.next().await.unwrap().unwrap_err().is_io());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_parse_stream_reports_protocol_errors_inline() {
        let input = b"+a\r\n:x\r\n+b\r\n".to_vec();
        let mut stream = parse_stream(std::io::Cursor::new(input));

        assert_eq!(stream.next().await.unwrap().unwrap(), Reply::status("a"));
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(ParseError::Protocol(_))
        ));
        assert_eq!(stream.next().await.unwrap().unwrap(), Reply::status("b"));
    }

    struct PanickingReader;

    impl AsyncRead for PanickingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            panic!("reader exploded");
        }
    }

    #[tokio::test]
    async fn test_parse_stream_survives_panic() {
        let mut stream = parse_stream(PanickingReader);
        assert!(stream.next().await.is_none());
    }
}
