//! RESP Protocol Implementation
//!
//! This module implements both directions of the Redis Serialization Protocol
//! (RESP): decoding frames off a byte stream and encoding replies back into
//! wire bytes.
//!
//! ## Modules
//!
//! - `reply`: Defines the `Reply` enum and its exact wire encoding
//! - `parser`: Streaming, resumable decoder for incoming RESP data
//!
//! The decoder works for both sides of a connection: a server decodes
//! requests (arrays of bulk strings, or inline commands) and a client decodes
//! responses (status, error, integer, bulk and array replies).
//!
//! ## Example
//!
//! ```ignore
//! use flashresp::protocol::{parse_stream, Reply};
//!
//! // Decoding a connection's read half
//! let mut payloads = parse_stream(read_half);
//! while let Some(payload) = payloads.next().await {
//!     match payload {
//!         Ok(request) => write_half.write_all(&Reply::ok().encode()).await?,
//!         Err(e) if e.is_io() => break,
//!         Err(e) => write_half.write_all(&Reply::error(format!("ERR {}", e)).encode()).await?,
//!     }
//! }
//! ```

pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use parser::{parse_one, parse_stream, Decoder, ParseError, Payload, PayloadStream};
pub use reply::Reply;
