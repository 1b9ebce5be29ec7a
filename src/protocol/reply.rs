//! RESP Reply Model and Encoder
//!
//! Every value that travels over the wire, in either direction, is a [`Reply`].
//! The decoder produces them from incoming bytes and the application turns its
//! results into them before they are encoded back into bytes.
//!
//! ## Wire Forms
//!
//! | Variant          | Encoding                                  |
//! |------------------|-------------------------------------------|
//! | `Status`         | `+<text>\r\n`                             |
//! | `Error`          | `-<text>\r\n`                             |
//! | `Integer`        | `:<i64>\r\n`                              |
//! | `Bulk`           | `$<len>\r\n<bytes>\r\n`                   |
//! | `NullBulk`       | `$-1\r\n`                                 |
//! | `MultiBulk`      | `*<n>\r\n` then each argument as a bulk   |
//! | `EmptyMultiBulk` | `*0\r\n`                                  |
//! | `MultiRaw`       | `*<n>\r\n` then each nested reply         |
//! | `Pong`           | `+PONG\r\n`                               |
//! | `Ok`             | `+OK\r\n`                                 |
//! | `Queued`         | `+QUEUED\r\n`                             |
//! | `NoReply`        | nothing                                   |
//!
//! ## Empty vs. Nil
//!
//! An empty bulk string (`$0\r\n\r\n`) and a nil bulk string (`$-1\r\n`) are
//! different values in Redis. `Bulk(Bytes::new())` encodes as the former,
//! `NullBulk` as the latter, and a `None` argument inside a `MultiBulk`
//! encodes as `$-1\r\n`.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

const NULL_BULK: &[u8] = b"$-1\r\n";
const EMPTY_MULTI_BULK: &[u8] = b"*0\r\n";
const PONG: &[u8] = b"+PONG\r\n";
const OK: &[u8] = b"+OK\r\n";
const QUEUED: &[u8] = b"+QUEUED\r\n";

static OK_REPLY: Reply = Reply::Ok;
static QUEUED_REPLY: Reply = Reply::Queued;

/// A RESP reply.
///
/// Replies are immutable once built. Use [`Reply::encode`] to get the exact
/// bytes to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Single-line status text. Must not contain CR or LF.
    Status(String),

    /// Single-line error text, e.g. `ERR unknown command`.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe string.
    Bulk(Bytes),

    /// The nil bulk string.
    NullBulk,

    /// Array of bulk strings; `None` elements are nil.
    MultiBulk(Vec<Option<Bytes>>),

    /// The empty array.
    EmptyMultiBulk,

    /// Array of arbitrary nested replies.
    MultiRaw(Vec<Reply>),

    Pong,
    Ok,
    Queued,

    /// Produces no bytes at all, for commands that must stay silent.
    NoReply,
}

impl Reply {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::Reply;
    /// assert_eq!(&Reply::status("OK").encode()[..], b"+OK\r\n");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply.
    ///
    /// # Example
    /// ```
    /// use flashresp::protocol::Reply;
    /// let err = Reply::error("ERR unknown command");
    /// assert_eq!(err.error_message(), Some("ERR unknown command"));
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates a multi-bulk reply where every argument is present.
    pub fn multi_bulk<I, B>(args: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Reply::MultiBulk(args.into_iter().map(|a| Some(a.into())).collect())
    }

    pub fn multi_raw(replies: Vec<Reply>) -> Self {
        Reply::MultiRaw(replies)
    }

    /// The shared `+OK` reply.
    pub fn ok() -> &'static Reply {
        &OK_REPLY
    }

    /// The shared `+QUEUED` reply.
    pub fn queued() -> &'static Reply {
        &QUEUED_REPLY
    }

    /// Encodes the reply into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Appends the encoded reply to `buf`.
    ///
    /// Nested replies are written in place, so a `MultiRaw` never builds
    /// intermediate buffers for its children.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Status(s) => write_line(buf, prefix::STATUS, s.as_bytes()),
            Reply::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            Reply::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            Reply::Bulk(data) => write_bulk(buf, data),
            Reply::NullBulk => buf.put_slice(NULL_BULK),
            Reply::MultiBulk(args) => {
                write_line(buf, prefix::ARRAY, args.len().to_string().as_bytes());
                for arg in args {
                    match arg {
                        Some(data) => write_bulk(buf, data),
                        None => buf.put_slice(NULL_BULK),
                    }
                }
            }
            Reply::EmptyMultiBulk => buf.put_slice(EMPTY_MULTI_BULK),
            Reply::MultiRaw(replies) => {
                write_line(buf, prefix::ARRAY, replies.len().to_string().as_bytes());
                for reply in replies {
                    reply.encode_into(buf);
                }
            }
            Reply::Pong => buf.put_slice(PONG),
            Reply::Ok => buf.put_slice(OK),
            Reply::Queued => buf.put_slice(QUEUED),
            Reply::NoReply => {}
        }
    }

    /// Returns true if the encoded reply starts with `-`.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// The message of an error reply, without re-parsing its bytes.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Reply::Error(msg) => Some(msg),
            _ => None,
        }
    }

    /// Attempts to extract the arguments of a multi-bulk reply.
    pub fn as_args(&self) -> Option<&[Option<Bytes>]> {
        match self {
            Reply::MultiBulk(args) => Some(args),
            _ => None,
        }
    }

    // Rough size so small replies encode without reallocating.
    fn encoded_len_hint(&self) -> usize {
        match self {
            Reply::Bulk(data) => data.len() + 16,
            Reply::MultiBulk(args) => {
                16 + args
                    .iter()
                    .map(|a| a.as_ref().map_or(5, |d| d.len() + 16))
                    .sum::<usize>()
            }
            Reply::Status(s) | Reply::Error(s) => s.len() + 3,
            _ => 32,
        }
    }
}

fn write_line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.put_u8(prefix);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}

fn write_bulk(buf: &mut BytesMut, data: &[u8]) {
    write_line(buf, prefix::BULK, data.len().to_string().as_bytes());
    buf.reserve(data.len() + 2);
    buf.put_slice(data);
    buf.put_slice(CRLF);
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(data) => fmt_bulk(f, data),
            Reply::NullBulk => write!(f, "(nil)"),
            Reply::MultiBulk(args) => {
                writeln!(f)?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{}) ", i + 1)?;
                    match arg {
                        Some(data) => fmt_bulk(f, data)?,
                        None => write!(f, "(nil)")?,
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            Reply::EmptyMultiBulk => write!(f, "(empty array)"),
            Reply::MultiRaw(replies) => {
                writeln!(f)?;
                for (i, r) in replies.iter().enumerate() {
                    writeln!(f, "{}) {}", i + 1, r)?;
                }
                Ok(())
            }
            Reply::Pong => write!(f, "PONG"),
            Reply::Ok => write!(f, "OK"),
            Reply::Queued => write!(f, "QUEUED"),
            Reply::NoReply => Ok(()),
        }
    }
}

fn fmt_bulk(f: &mut fmt::Formatter<'_>, data: &[u8]) -> fmt::Result {
    match std::str::from_utf8(data) {
        Ok(s) => write!(f, "\"{}\"", s),
        Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
    }
}
