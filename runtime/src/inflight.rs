//! Tracking of messages handed to processing but not yet settled.
//!
//! Consumers never wait for completion before polling again, but shutdown can
//! optionally drain: wait until every outstanding settlement has run.

use crate::metrics::LeaseMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Shared counter of unsettled messages.
#[derive(Clone)]
pub struct InFlight {
    count: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
    completion: watch::Receiver<()>,
}

impl InFlight {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(());
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            notifier: Arc::new(tx),
            completion: rx,
        }
    }

    /// Register one unsettled message. Dropping the guard settles it.
    #[must_use]
    pub fn enter(&self) -> InFlightGuard {
        let now = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        LeaseMetrics::record_in_flight(now);
        InFlightGuard {
            count: Arc::clone(&self.count),
            notifier: Arc::clone(&self.notifier),
        }
    }

    /// Current number of unsettled messages.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until nothing is in flight.
    pub async fn wait_idle(&self) {
        let mut completion = self.completion.clone();
        while self.count.load(Ordering::SeqCst) > 0 {
            if completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait until nothing is in flight, up to `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the number still in flight if the timeout expires first.
    pub async fn wait_idle_timeout(&self, timeout: Duration) -> Result<(), usize> {
        tokio::time::timeout(timeout, self.wait_idle())
            .await
            .map_err(|_| self.count())
    }
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

/// Decrements the in-flight count on drop, even if processing panicked.
pub struct InFlightGuard {
    count: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let previous = self.count.fetch_sub(1, Ordering::SeqCst);
        LeaseMetrics::record_in_flight(previous.saturating_sub(1));
        if previous == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}
