//! # FlashRESP - The Networking and Protocol Core of FlashKV
//!
//! FlashRESP is the layer of a Redis-compatible server that sits between the
//! TCP socket and the command engine. It decodes RESP frames off raw byte
//! streams, encodes replies back to wire bytes, and manages the lifecycle of
//! many concurrent client connections, including graceful shutdown with a
//! bounded drain window.
//!
//! ## Features
//!
//! - **Streaming Decoder**: Resumable RESP state machine, independent of how
//!   network reads split the stream
//! - **Binary Safe**: Bulk strings are read by declared length, never by line
//! - **Exact Encoding**: Every reply variant has one fixed wire form
//! - **Graceful Shutdown**: In-flight writes get a bounded window to finish
//! - **Async I/O**: Built on Tokio, one task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashRESP                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Accept loop │───>│  Handler    │───>│  Decoder    │──> Payload       │
//! │  │ (server)    │    │ (per conn)  │    │  (task)     │                  │
//! │  └──────┬──────┘    └──────┬──────┘    └─────────────┘                  │
//! │         │                  │                                            │
//! │         │                  ▼                                            │
//! │         │           ┌─────────────┐                                     │
//! │         │           │  Reply      │──> wire bytes                       │
//! │         │           │  encoder    │                                     │
//! │         │           └─────────────┘                                     │
//! │         ▼                                                               │
//! │  shutdown signal ──> close listener ──> Handler::close (drain + close)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use flashresp::{listen_and_serve, Config, EchoHandler};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(&config.address).await?;
//!     let handler = Arc::new(EchoHandler::new());
//!
//!     listen_and_serve(listener, handler, &config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP reply model, encoder and streaming decoder
//! - [`connection`]: Handler capability, echo handler, drain primitive
//! - [`server`]: Accept loop and shutdown coordination
//! - [`config`]: Listener configuration from CLI and TOML

pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{CliArgs, Config};
pub use connection::{ConnContext, ConnectionStats, EchoHandler, Handler};
pub use protocol::{parse_one, parse_stream, ParseError, Payload, Reply};
pub use server::{listen_and_serve, listen_and_serve_with_signal, Accept};

/// The default port FlashRESP listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FlashRESP binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of FlashRESP
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
