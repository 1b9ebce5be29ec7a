//! Application Handler Module
//!
//! The accept loop hands every connection to a [`Handler`]. A handler owns
//! everything that happens on the connection afterwards and must be able to
//! release all of its connections when the server shuts down.
//!
//! [`EchoHandler`] is the handler shipped with this crate. It decodes RESP
//! frames and writes each one straight back, which is enough to exercise the
//! decoder, the encoder and the shutdown path end to end.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. handle() called by the accept loop
//!        │
//!        ▼
//! 2. Record inserted into the registry ── handler closing? ──> rejected
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  next Payload from decoder   │◄──┐
//!    │  encode reply                │   │
//!    │  write (counted in flight)   │───┘
//!    └──────────────────────────────┘
//!        │ EOF / I/O error / closed by shutdown
//!        ▼
//! 4. Record removed from the registry
//! ```
//!
//! ## Shutdown
//!
//! `close()` marks the handler as closing, then closes every tracked
//! connection concurrently. Each one gets up to the drain timeout to finish
//! its in-flight write before the socket is dropped regardless.

use crate::connection::wait::Wait;
use crate::protocol::{parse_stream, ParseError, Payload, PayloadStream, Reply};
use async_trait::async_trait;
use bytes::BytesMut;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// How long a connection may take to finish in-flight work at shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Initial capacity of the per-connection write buffer
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Identity of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnContext {
    /// Assigned by the accept loop, unique for the listener's lifetime
    pub id: u64,
    pub peer: SocketAddr,
}

/// The application layer plugged into the accept loop.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Serves one connection until the peer goes away, an unrecoverable
    /// error occurs, or the handler closes it.
    async fn handle(&self, ctx: ConnContext, stream: TcpStream);

    /// Stops taking new connections and releases every tracked one.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Connections that were served
    pub connections_accepted: AtomicU64,
    /// Connections turned away because the handler was closing
    pub connections_rejected: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Frames decoded successfully
    pub frames_decoded: AtomicU64,
    /// Protocol errors reported to clients
    pub protocol_errors: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_decoded(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Registry entry for one live connection.
#[derive(Debug)]
pub struct TrackedConnection {
    ctx: ConnContext,
    waiting: Wait,
    closed: watch::Sender<bool>,
}

impl TrackedConnection {
    fn new(ctx: ConnContext) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            ctx,
            waiting: Wait::new(),
            closed,
        }
    }

    pub fn context(&self) -> ConnContext {
        self.ctx
    }

    pub fn in_flight(&self) -> usize {
        self.waiting.in_flight()
    }

    /// Waits up to `drain` for in-flight work, then tells the connection
    /// task to drop its socket.
    pub async fn close(&self, drain: Duration) {
        if self.waiting.wait_with_timeout(drain).await {
            warn!(
                client = %self.ctx.peer,
                id = self.ctx.id,
                in_flight = self.waiting.in_flight(),
                "Drain timed out, forcing connection closed"
            );
        }
        self.closed.send_replace(true);
    }
}

async fn closed(rx: &mut watch::Receiver<bool>) {
    // The sender lives as long as the record, which outlives this task's use of it
    let _ = rx.wait_for(|closed| *closed).await;
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Closed by the handler during shutdown
    #[error("Connection closed by server")]
    Closed,

    /// Nothing received within the idle timeout
    #[error("Idle timeout")]
    IdleTimeout,

    /// The decode task ended without reporting why
    #[error("Decoder stopped unexpectedly")]
    DecoderFault,
}

/// Handler that writes every decoded frame back to its sender.
///
/// Protocol errors are answered with `-ERR protocol error: ...` and the
/// connection carries on.
#[derive(Debug)]
pub struct EchoHandler {
    active: DashMap<u64, Arc<TrackedConnection>>,
    closing: AtomicBool,
    drain_timeout: Duration,
    idle_timeout: Option<Duration>,
    stats: Arc<ConnectionStats>,
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoHandler {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            closing: AtomicBool::new(false),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            idle_timeout: None,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    /// Sets how long each connection may drain at shutdown.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Closes connections that send nothing for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Number of connections currently in the registry.
    pub fn active_connections(&self) -> usize {
        self.active.len()
    }

    /// Operations in flight across all tracked connections.
    pub fn in_flight(&self) -> usize {
        self.active.iter().map(|entry| entry.value().in_flight()).sum()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// The read-decode-echo loop for one connection.
    async fn serve(
        &self,
        conn: &TrackedConnection,
        stream: TcpStream,
    ) -> Result<(), ConnectionError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut payloads = parse_stream(read_half);
        let mut closed_rx = conn.closed.subscribe();
        let mut buffer = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);

        loop {
            let payload = tokio::select! {
                _ = closed(&mut closed_rx) => return Err(ConnectionError::Closed),
                payload = self.next_payload(&mut payloads) => payload?,
            };

            let reply = match payload {
                Some(Ok(reply)) => {
                    self.stats.frame_decoded();
                    reply
                }
                Some(Err(ParseError::Io(e))) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(ConnectionError::ClientDisconnected);
                }
                Some(Err(ParseError::Io(e))) => return Err(e.into()),
                Some(Err(e)) => {
                    self.stats.protocol_error();
                    debug!(client = %conn.ctx.peer, error = %e, "Protocol error");
                    Reply::error(format!("ERR {}", e))
                }
                None => return Err(ConnectionError::DecoderFault),
            };

            buffer.clear();
            reply.encode_into(&mut buffer);
            if buffer.is_empty() {
                continue;
            }

            let _in_flight = conn.waiting.enter();
            tokio::select! {
                _ = closed(&mut closed_rx) => return Err(ConnectionError::Closed),
                result = write_half.write_all(&buffer) => result?,
            }
            self.stats.bytes_written(buffer.len());
            trace!(client = %conn.ctx.peer, bytes = buffer.len(), "Sent reply");
        }
    }

    async fn next_payload(
        &self,
        payloads: &mut PayloadStream,
    ) -> Result<Option<Payload>, ConnectionError> {
        match self.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, payloads.next())
                .await
                .map_err(|_| ConnectionError::IdleTimeout),
            None => Ok(payloads.next().await),
        }
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn handle(&self, ctx: ConnContext, stream: TcpStream) {
        let conn = Arc::new(TrackedConnection::new(ctx));
        self.active.insert(ctx.id, Arc::clone(&conn));

        // Checked after registering so close() either sees this record or
        // we see its flag. close() stores the flag before snapshotting the
        // registry and we insert before loading it; with SeqCst on the flag
        // and the shard lock on the map, at least one side sees the other.
        if self.is_closing() {
            self.active.remove(&ctx.id);
            self.stats.connection_rejected();
            debug!(client = %ctx.peer, id = ctx.id, "Handler closing, rejecting connection");
            return;
        }

        self.stats.connection_opened();
        info!(client = %ctx.peer, id = ctx.id, "Client connected");

        let result = self.serve(&conn, stream).await;

        self.active.remove(&ctx.id);
        self.stats.connection_closed();

        match result {
            Ok(()) | Err(ConnectionError::ClientDisconnected) => {
                info!(client = %ctx.peer, id = ctx.id, "Client disconnected")
            }
            Err(ConnectionError::IoError(ref e)) if e.kind() == ErrorKind::ConnectionReset => {
                debug!(client = %ctx.peer, id = ctx.id, "Connection reset by client")
            }
            Err(ConnectionError::Closed) => {
                debug!(client = %ctx.peer, id = ctx.id, "Connection closed by shutdown")
            }
            Err(e) => warn!(client = %ctx.peer, id = ctx.id, error = %e, "Connection error"),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        info!("Handler shutting down");
        self.closing.store(true, Ordering::SeqCst);

        let conns: Vec<Arc<TrackedConnection>> = self
            .active
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut closing = JoinSet::new();
        for conn in conns {
            let drain = self.drain_timeout;
            closing.spawn(async move { conn.close(drain).await });
        }
        while closing.join_next().await.is_some() {}

        Ok(())
    }
}
