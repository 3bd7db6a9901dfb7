//! Lease Relay - queue to topic forwarding demo
//!
//! Leases messages from a source queue, relays each one to a destination
//! topic, and commits the lease only once the send succeeded. A failed send
//! rolls the lease back so the message is redelivered (or dead-lettered when
//! the source endpoint has `deadLetterOnFailure=true`).
//!
//! Runs against the in-memory broker from `leasebus-testing`.
//!
//! # Running the Example
//!
//! ```bash
//! cargo run -p lease-relay -- demos/lease-relay/relay.toml
//! ```

#![allow(missing_docs)]

mod config;

use crate::config::RelayConfig;
use leasebus_core::clock::SystemClock;
use leasebus_core::error::ProcessingError;
use leasebus_core::exchange::{Exchange, ProcessFuture, Processor};
use leasebus_core::metadata::{Metadata, headers};
use leasebus_core::{EndpointConfig, WireMessage};
use leasebus_runtime::metrics::MetricsServer;
use leasebus_runtime::{Endpoint, OutboundSender, PollScheduler};
use leasebus_testing::InMemoryBroker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Headers carried over from the leased message to the relayed one.
const RELAYED_HEADERS: &[&str] = &[
    headers::CORRELATION_ID,
    headers::LABEL,
    headers::SESSION_ID,
    headers::APPLICATION_PROPERTIES,
];

struct RelayProcessor {
    producer: OutboundSender,
}

impl Processor for RelayProcessor {
    fn process(&self, exchange: Exchange) -> ProcessFuture<'_> {
        Box::pin(async move {
            let metadata: Metadata = RELAYED_HEADERS
                .iter()
                .filter_map(|name| {
                    exchange
                        .metadata
                        .get(name)
                        .filter(|value| !value.is_null())
                        .map(|value| ((*name).to_string(), value.clone()))
                })
                .collect();

            let mut outbound = Exchange::new(exchange.payload).with_metadata(metadata);
            outbound.message_id = exchange.message_id;

            self.producer
                .send(outbound)
                .await
                .map_err(|e| ProcessingError::from_error(&e))
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,leasebus_runtime=debug,lease_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = RelayConfig::load(config_path.as_deref())?;
    tracing::info!(?config, "Starting lease relay");

    let mut metrics = config.metrics_addr.map(MetricsServer::new);
    if let Some(server) = metrics.as_mut() {
        server.serve()?;
    }

    let source_config = EndpointConfig::from_uri(&config.source_uri)?;
    let destination_config = EndpointConfig::from_uri(&config.destination_uri)?;
    let broker = InMemoryBroker::with_clock(Arc::new(SystemClock));

    let destination = Endpoint::new(destination_config, Arc::new(broker.clone()))
        .start()
        .await?;
    let source = Endpoint::new(source_config, Arc::new(broker.clone()))
        .start()
        .await?;

    let Some(source_path) = source.config().receive_source().map(|s| s.path()) else {
        anyhow::bail!("source endpoint {} cannot be consumed", source.config());
    };
    let audit_path = destination.config().receive_source().map(|s| s.path());

    for i in 0..config.seed_messages {
        broker.enqueue(
            &source_path,
            WireMessage::new(format!("order #{i}"))
                .with_message_id(format!("order-{i}"))
                .with_correlation_id(format!("checkout-{i}"))
                .with_application_property("region", "eu-west"),
        );
    }
    tracing::info!(count = config.seed_messages, entity = %source_path, "Seeded source");

    let processor: Arc<dyn Processor> = Arc::new(RelayProcessor {
        producer: destination.create_producer(),
    });
    let handle = PollScheduler::new(config.poll_interval()).spawn(source.create_consumers(&processor)?);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
        () = wait_for_relay(&broker, &source_path, config.poll_interval()) => {
            tracing::info!("Source drained");
        }
    }

    if let Err(unsettled) = handle.drain(config.drain_timeout()).await {
        tracing::warn!(unsettled, "Drain timed out; remaining leases will expire");
    }
    if let Some(path) = audit_path {
        tracing::info!(entity = %path, relayed = broker.pending(&path), "Relay finished");
    }
    if let Some(text) = metrics.as_ref().and_then(MetricsServer::render) {
        tracing::debug!(metrics = %text, "Final metrics");
    }

    source.stop();
    destination.stop();
    Ok(())
}

async fn wait_for_relay(broker: &InMemoryBroker, source_path: &str, interval: Duration) {
    while broker.pending(source_path) > 0 || broker.leased() > 0 {
        tokio::time::sleep(interval).await;
    }
}
