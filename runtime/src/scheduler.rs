//! Fixed-cadence poll loops.
//!
//! One loop per consumer, each with a single poll in flight. Poll failures are
//! reported to the exception sink and retried on the next tick. Stopping ends
//! the loops but leaves unsettled messages to finish or expire.

use crate::consumer::LeaseConsumer;
use crate::inflight::InFlight;
use leasebus_core::sink::{ExceptionSink, FailureReport, FailureStage, TracingExceptionSink};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Default delay between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives [`LeaseConsumer::poll`] on a fixed cadence.
pub struct PollScheduler {
    interval: Duration,
    sink: Arc<dyn ExceptionSink>,
}

impl PollScheduler {
    /// Create a scheduler polling every `interval` (at least one millisecond).
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            sink: Arc::new(TracingExceptionSink),
        }
    }

    /// Report poll failures to `sink`.
    #[must_use]
    pub fn with_exception_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Spawn one poll loop per consumer.
    #[must_use]
    pub fn spawn(&self, consumers: Vec<LeaseConsumer>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut in_flight = Vec::with_capacity(consumers.len());
        let mut tasks = Vec::with_capacity(consumers.len());

        for consumer in consumers {
            in_flight.push(consumer.in_flight().clone());
            tasks.push(tokio::spawn(poll_loop(
                consumer,
                self.interval,
                Arc::clone(&self.sink),
                shutdown_rx.clone(),
            )));
        }

        tracing::info!(consumers = tasks.len(), interval = ?self.interval, "Poll scheduler started");
        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks,
            in_flight,
        }
    }
}

impl Default for PollScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl std::fmt::Debug for PollScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollScheduler")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

async fn poll_loop(
    consumer: LeaseConsumer,
    interval: Duration,
    sink: Arc<dyn ExceptionSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(error) = consumer.poll().await {
                    tracing::warn!(
                        entity = %consumer.source().path(),
                        error = %error,
                        "Poll failed, retrying on next tick"
                    );
                    sink.report(FailureReport::new(
                        FailureStage::Receive,
                        consumer.source().path(),
                        &error,
                    ));
                }
            }
        }
    }

    tracing::debug!(entity = %consumer.source().path(), "Poll loop stopped");
}

/// Controls running poll loops.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    in_flight: Vec<InFlight>,
}

impl SchedulerHandle {
    /// Number of running poll loops.
    #[must_use]
    pub fn consumers(&self) -> usize {
        self.tasks.len()
    }

    /// Stop polling and wait for the loops to exit.
    ///
    /// Messages already handed to processing keep running and settle normally.
    pub async fn stop(self) {
        self.stop_loops().await;
    }

    /// Stop polling, then wait up to `timeout` for unsettled messages.
    ///
    /// # Errors
    ///
    /// Returns the number of messages still unsettled when the timeout expired.
    pub async fn drain(self, timeout: Duration) -> Result<(), usize> {
        let in_flight = self.stop_loops().await;
        let deadline = tokio::time::Instant::now() + timeout;
        for tracker in &in_flight {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tracker.wait_idle_timeout(remaining).await?;
        }
        Ok(())
    }

    async fn stop_loops(self) -> Vec<InFlight> {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Poll loop task failed");
            }
        }
        tracing::info!("Poll scheduler stopped");
        self.in_flight
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("consumers", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_clamped() {
        let scheduler = PollScheduler::new(Duration::ZERO);
        assert_eq!(scheduler.interval, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn empty_schedule_stops_immediately() {
        let handle = PollScheduler::default().spawn(Vec::new());
        assert_eq!(handle.consumers(), 0);
        assert_eq!(handle.drain(Duration::from_millis(10)).await, Ok(()));
    }
}
