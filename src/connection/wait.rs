//! In-flight operation counter with a bounded wait.
//!
//! Each connection counts the operations it has started but not finished
//! (a reply being written, for instance). Shutdown waits for that count to
//! drop to zero before closing the socket, but never longer than the drain
//! timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Counts in-flight operations and lets other tasks wait for them to drain.
#[derive(Debug, Default)]
pub struct Wait {
    count: AtomicUsize,
    drained: Notify,
}

impl Wait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one operation as started. It ends when the guard is dropped.
    pub fn enter(&self) -> WaitGuard<'_> {
        self.count.fetch_add(1, Ordering::AcqRel);
        WaitGuard { wait: self }
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Waits until no operation is in flight.
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking the count so a concurrent `done`
            // cannot slip between the check and the await.
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Waits for the drain, giving up after `timeout`.
    ///
    /// Returns `true` if the timeout elapsed first.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_err()
    }
}

/// Ends one in-flight operation on drop.
#[derive(Debug)]
pub struct WaitGuard<'a> {
    wait: &'a Wait,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.wait.done();
    }
}
