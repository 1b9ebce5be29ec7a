//! TCP accept loop and shutdown coordination.
//!
//! [`listen_and_serve`] accepts connections and gives each one its own task
//! running [`Handler::handle`]. The loop never waits on those tasks, so one
//! slow client cannot hold up the next accept.
//!
//! ## Shutdown
//!
//! Teardown runs the same way whichever of these happens first:
//! - the shutdown future completes
//! - `accept()` fails with a listener-level error
//!
//! The listener is dropped first so no new connection can arrive, then
//! [`Handler::close`] drains and closes every tracked connection.

use crate::config::Config;
use crate::connection::{ConnContext, Handler};
use anyhow::Context;
use async_trait::async_trait;
use std::future::Future;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Source of incoming connections for the accept loop.
#[async_trait]
pub trait Accept: Send {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Accept for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Runs the accept loop on `listener` until `shutdown` completes or accepting
/// fails, then closes the listener and the handler.
///
/// `config.max_connect` caps how many connections are served at once; the
/// loop stops accepting while the cap is reached. `0` means no cap.
///
/// Returns the accept error that ended the loop, if any.
pub async fn listen_and_serve<L, H, F>(
    mut listener: L,
    handler: Arc<H>,
    config: &Config,
    shutdown: F,
) -> anyhow::Result<()>
where
    L: Accept,
    H: Handler,
    F: Future<Output = ()>,
{
    let limit = (config.max_connect > 0)
        .then(|| Arc::new(Semaphore::new(config.max_connect as usize)));
    let mut next_id: u64 = 0;

    tokio::pin!(shutdown);

    let result = loop {
        // Wait for a connection slot
        let permit = match &limit {
            Some(limit) => tokio::select! {
                _ = &mut shutdown => break Ok(()),
                permit = Arc::clone(limit).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(e) => break Err(anyhow::Error::new(e)),
                },
            },
            None => None,
        };

        let accepted = tokio::select! {
            _ = &mut shutdown => break Ok(()),
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                next_id += 1;
                let ctx = ConnContext { id: next_id, peer };
                debug!(client = %peer, id = ctx.id, "Accepted connection");

                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle(ctx, stream).await;
                    drop(permit);
                });
            }
            Err(e) if is_connection_error(&e) => {
                warn!(error = %e, "Failed to accept connection");
            }
            Err(e) => {
                error!(error = %e, "Accept failed, shutting down");
                break Err(anyhow::Error::new(e).context("accept failed"));
            }
        }
    };

    info!("Shutting down...");
    drop(listener);
    if let Err(e) = handler.close().await {
        error!(error = %e, "Handler failed to close cleanly");
    }
    info!("Server shutdown complete");

    result
}

/// Binds `config.address` and serves until Ctrl+C.
pub async fn listen_and_serve_with_signal<H>(config: Config, handler: Arc<H>) -> anyhow::Result<()>
where
    H: Handler,
{
    let listener = TcpListener::bind(&config.address)
        .await
        .with_context(|| format!("failed to bind {}", config.address))?;
    info!(address = %config.address, "Listening");

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    listen_and_serve(listener, handler, &config, shutdown).await
}

/// Accept errors that only concern the connection being accepted.
fn is_connection_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
