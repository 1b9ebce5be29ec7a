//! Connection Handling Module
//!
//! This module holds the application side of the connection lifecycle: the
//! [`Handler`] capability the accept loop calls into, the echo handler that
//! implements it, and the in-flight counter used to drain connections at
//! shutdown.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Accept loop                             │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ spawn task per connection
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Handler::handle                             │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ Read bytes  │───>│ Decode RESP │───>│ Encode +    │      │
//! │  │ (decoder)   │    │ (Payload)   │    │ write reply │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                                             │
//! │  registry: DashMap<id, TrackedConnection>                   │
//! └─────────────────────────────────────────────────────────────┘
//!                        ▲
//!                        │ Handler::close (drain, then force close)
//!                  shutdown signal
//! ```

pub mod handler;
pub mod wait;

// Re-export commonly used types
pub use handler::{
    ConnContext, ConnectionError, ConnectionStats, EchoHandler, Handler, TrackedConnection,
    DEFAULT_DRAIN_TIMEOUT,
};
pub use wait::{Wait, WaitGuard};
