//! In-flight Write Tracking
//!
//! Every reply a connection writes is bracketed by a [`DrainGuard`]. The
//! shutdown path calls [`DrainTracker::wait_drained`] before closing the
//! socket, so a reply that is already on its way out is never cut short.
//!
//! The counter is a plain atomic: the connection task bumps it, the shutdown
//! task only reads it and waits on a [`Notify`] for it to hit zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

/// Counts outstanding units of work on one connection.
#[derive(Debug, Default)]
pub struct DrainTracker {
    in_flight: AtomicUsize,
    drained: Notify,
}

impl DrainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one unit of work as started.
    ///
    /// The unit ends when the returned guard is dropped.
    pub fn begin(&self) -> DrainGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        DrainGuard { tracker: self }
    }

    /// Number of units currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Waits until nothing is in flight or `timeout` elapses.
    ///
    /// Returns `true` if the tracker drained, `false` on timeout.
    pub async fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking the count so a concurrent
            // `end` between the check and the await is not missed.
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight() == 0 {
                return true;
            }

            if time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight() == 0;
            }
        }
    }

    fn end(&self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// Ends one unit of in-flight work on drop.
#[must_use = "the unit of work ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct DrainGuard<'a> {
    tracker: &'a DrainTracker,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.tracker.end();
    }
}
