//! Prometheus metrics for the lease protocol.
//!
//! Recorders are plain unit structs with associated functions; they go
//! through the `metrics` facade and are no-ops until a recorder is installed.
//!
//! - Lease lifecycle: receive, commit, rollback, dead-letter, in-flight gauge
//! - Provisioning: entities created or found
//! - Outbound sends
//!
//! # Example
//!
//! ```rust,no_run
//! use leasebus_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.serve()?;
//!
//! // Also scraped at http://localhost:9090/metrics
//! let text = server.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
    /// Failed to bind the HTTP listener
    #[error("Failed to bind metrics server: {0}")]
    Bind(String),
}

/// Prometheus metrics exporter.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server for `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Describe all metrics and install the Prometheus recorder.
    ///
    /// Metrics are rendered on demand through [`render`](Self::render); nothing
    /// listens on the configured address. Use [`serve`](Self::serve) for that.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match prometheus_builder()?.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => already_installed(e.to_string()),
        }
    }

    /// Install the Prometheus recorder and serve `/metrics` over HTTP on the
    /// configured address.
    ///
    /// Must be called from within a Tokio runtime; the listener runs as a
    /// spawned task for the life of the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Bind`] if the address cannot be bound, or
    /// [`MetricsError`] if the exporter cannot be built or installed.
    /// A recorder that is already installed is not an error, but then nothing
    /// is served.
    pub fn serve(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = prometheus_builder()?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| match e {
                BuildError::FailedToCreateHTTPListener(reason) => MetricsError::Bind(reason),
                other => MetricsError::Build(other.to_string()),
            })?;
        let handle = recorder.handle();

        if let Err(e) = metrics::set_global_recorder(recorder) {
            return already_installed(e.to_string());
        }
        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::warn!("Metrics listener stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// The exporter handle, once started.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn prometheus_builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))
}

fn already_installed(err_msg: String) -> Result<(), MetricsError> {
    if err_msg.contains("already initialized") {
        tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
        Ok(())
    } else {
        Err(MetricsError::Install(err_msg))
    }
}

fn register_metrics() {
    describe_counter!(
        "lease_messages_received_total",
        "Total number of messages received"
    );
    describe_counter!(
        "lease_empty_polls_total",
        "Total number of polls that obtained no message"
    );
    describe_counter!(
        "lease_receive_errors_total",
        "Total number of failed receive calls"
    );
    describe_counter!(
        "lease_commits_total",
        "Total number of leased messages deleted after processing"
    );
    describe_counter!(
        "lease_rollbacks_total",
        "Total number of leased messages unlocked after failed processing"
    );
    describe_counter!(
        "lease_dead_lettered_total",
        "Total number of messages dead-lettered after failed processing"
    );
    describe_counter!(
        "lease_commit_errors_total",
        "Total number of failed delete calls"
    );
    describe_counter!(
        "lease_rollback_errors_total",
        "Total number of failed unlock or dead-letter calls"
    );
    describe_gauge!(
        "lease_in_flight",
        "Messages handed to processing and not yet settled"
    );
    describe_histogram!(
        "lease_processing_duration_seconds",
        "Time from receive to the end of processing"
    );

    describe_counter!(
        "provisioning_entities_created_total",
        "Total number of entities created at endpoint start"
    );
    describe_counter!(
        "provisioning_entities_present_total",
        "Total number of entities found already present at endpoint start"
    );

    describe_counter!("send_messages_total", "Total number of messages sent");
    describe_counter!("send_errors_total", "Total number of failed sends");
    describe_histogram!("send_duration_seconds", "Time taken to send a message");
}

/// Lease lifecycle metrics recorder.
pub struct LeaseMetrics;

impl LeaseMetrics {
    /// Record a received message.
    pub fn record_received(entity: &str) {
        counter!("lease_messages_received_total", "entity" => entity.to_string()).increment(1);
    }

    /// Record a poll that obtained nothing.
    pub fn record_empty_poll() {
        counter!("lease_empty_polls_total").increment(1);
    }

    /// Record a failed receive call.
    pub fn record_receive_error() {
        counter!("lease_receive_errors_total").increment(1);
    }

    /// Record the time from receive to the start of settlement.
    pub fn record_processing(duration: Duration) {
        histogram!("lease_processing_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a leased message deleted by the broker.
    pub fn record_commit() {
        counter!("lease_commits_total").increment(1);
    }

    /// Record a leased message unlocked by the broker.
    pub fn record_rollback() {
        counter!("lease_rollbacks_total").increment(1);
    }

    /// Record a dead-lettered message.
    pub fn record_dead_letter() {
        counter!("lease_dead_lettered_total").increment(1);
    }

    /// Record a failed delete call.
    pub fn record_commit_error() {
        counter!("lease_commit_errors_total").increment(1);
    }

    /// Record a failed unlock or dead-letter call.
    pub fn record_rollback_error() {
        counter!("lease_rollback_errors_total").increment(1);
    }

    /// Record the current in-flight count.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_in_flight(count: usize) {
        gauge!("lease_in_flight").set(count as f64);
    }
}

/// Provisioning metrics recorder.
pub struct ProvisioningMetrics;

impl ProvisioningMetrics {
    /// Record an entity created by this endpoint or a concurrent creator.
    pub fn record_created(collection: &str) {
        counter!("provisioning_entities_created_total", "collection" => collection.to_string())
            .increment(1);
    }

    /// Record an entity that already existed.
    pub fn record_present(collection: &str) {
        counter!("provisioning_entities_present_total", "collection" => collection.to_string())
            .increment(1);
    }
}

/// Outbound send metrics recorder.
pub struct SendMetrics;

impl SendMetrics {
    /// Record a successful send.
    pub fn record_send(duration: Duration) {
        counter!("send_messages_total").increment(1);
        histogram!("send_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record a failed send.
    pub fn record_error() {
        counter!("send_errors_total").increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
    }

    #[tokio::test]
    async fn test_lease_metrics_render() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let mut server = MetricsServer::new(addr);
        server.start().unwrap();

        LeaseMetrics::record_received("orders");
        LeaseMetrics::record_processing(Duration::from_millis(20));
        LeaseMetrics::record_commit();
        LeaseMetrics::record_in_flight(2);
        ProvisioningMetrics::record_created("queues");
        SendMetrics::record_send(Duration::from_millis(5));

        // The recorder is global; another test may have installed it first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("lease_messages_received_total"));
            assert!(rendered.contains("lease_commits_total"));
            assert!(rendered.contains("provisioning_entities_created_total"));
            assert!(rendered.contains("send_messages_total"));
        }
    }

    #[tokio::test]
    async fn serve_reports_an_address_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut server = MetricsServer::new(taken.local_addr().unwrap());

        assert!(matches!(server.serve(), Err(MetricsError::Bind(_))));
        assert!(server.handle().is_none());
    }
}
