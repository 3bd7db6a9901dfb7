//! Endpoint lifecycle: connect, provision, then hand out consumers and producers.
//!
//! The broker client handle is created by [`Endpoint::start`] and owned by the
//! resulting [`StartedEndpoint`]. Consumers and producers share it read-only.
//! Stopping never recalls leases; unsettled messages expire on the broker.

use crate::completion::CompletionHandler;
use crate::consumer::LeaseConsumer;
use crate::inflight::InFlight;
use crate::provisioner::{EntityProvisioner, ProvisioningReport};
use crate::sender::OutboundSender;
use leasebus_core::broker::{BrokerClient, BrokerConnector};
use leasebus_core::config::EndpointConfig;
use leasebus_core::error::EndpointError;
use leasebus_core::exchange::Processor;
use leasebus_core::sink::{ExceptionSink, TracingExceptionSink};
use leasebus_core::translator::{AttributeTranslator, HeaderFilter};
use std::sync::Arc;

/// A configured, not yet started endpoint.
pub struct Endpoint {
    config: Arc<EndpointConfig>,
    connector: Arc<dyn BrokerConnector>,
    sink: Arc<dyn ExceptionSink>,
    header_filter: Option<Arc<dyn HeaderFilter>>,
}

impl Endpoint {
    /// Create an endpoint that reports absorbed failures through `tracing`.
    #[must_use]
    pub fn new(config: EndpointConfig, connector: Arc<dyn BrokerConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            sink: Arc::new(TracingExceptionSink),
            header_filter: None,
        }
    }

    /// Report absorbed failures to `sink`.
    #[must_use]
    pub fn with_exception_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Filter which inbound application properties become headers.
    #[must_use]
    pub fn with_header_filter(mut self, filter: Arc<dyn HeaderFilter>) -> Self {
        self.header_filter = Some(filter);
        self
    }

    /// The endpoint configuration.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// Connect to the broker and provision the endpoint's entities.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Connect`] if no client can be created and
    /// [`EndpointError::Provisioning`] if an entity cannot be verified or
    /// created. In both cases the endpoint does not start.
    pub async fn start(&self) -> Result<StartedEndpoint, EndpointError> {
        tracing::info!(endpoint = %self.config, "Starting endpoint");

        let client = self
            .connector
            .connect(&self.config)
            .await
            .map_err(EndpointError::Connect)?;

        let report = EntityProvisioner::new(Arc::clone(&client))
            .ensure_exists(&self.config)
            .await?;

        let mut translator = AttributeTranslator::new(self.config.content_type());
        if let Some(filter) = &self.header_filter {
            translator = translator.with_header_filter(Arc::clone(filter));
        }

        tracing::info!(
            endpoint = %self.config,
            created = report.created(),
            "Endpoint started"
        );

        Ok(StartedEndpoint {
            config: Arc::clone(&self.config),
            client,
            sink: Arc::clone(&self.sink),
            translator,
            report,
            in_flight: InFlight::new(),
        })
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A connected, provisioned endpoint.
pub struct StartedEndpoint {
    config: Arc<EndpointConfig>,
    client: Arc<dyn BrokerClient>,
    sink: Arc<dyn ExceptionSink>,
    translator: AttributeTranslator,
    report: ProvisioningReport,
    in_flight: InFlight,
}

impl StartedEndpoint {
    /// The endpoint configuration.
    #[must_use]
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// What provisioning found or created.
    #[must_use]
    pub const fn provisioning_report(&self) -> &ProvisioningReport {
        &self.report
    }

    /// Messages handed to processing by this endpoint's consumers and not yet settled.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Create one consumer feeding `processor`.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::NotConsumable`] for event streams and topics
    /// without a subscription.
    pub fn create_consumer(&self, processor: Arc<dyn Processor>) -> Result<LeaseConsumer, EndpointError> {
        let source = self
            .config
            .receive_source()
            .ok_or_else(|| EndpointError::NotConsumable(self.config.entity().to_string()))?;
        let completion = Arc::new(CompletionHandler::for_endpoint(
            Arc::clone(&self.client),
            Arc::clone(&self.sink),
            &self.config,
        ));
        Ok(LeaseConsumer::new(
            Arc::clone(&self.client),
            source,
            self.config.receive_options(),
            processor,
            completion,
        )
        .with_translator(self.translator.clone())
        .with_in_flight(self.in_flight.clone()))
    }

    /// Create `concurrentConsumers` independent consumers feeding `processor`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_consumer`].
    pub fn create_consumers(
        &self,
        processor: &Arc<dyn Processor>,
    ) -> Result<Vec<LeaseConsumer>, EndpointError> {
        (0..self.config.concurrent_consumers())
            .map(|_| self.create_consumer(Arc::clone(processor)))
            .collect()
    }

    /// Create a producer for the endpoint's entity.
    #[must_use]
    pub fn create_producer(&self) -> OutboundSender {
        OutboundSender::new(Arc::clone(&self.client), self.config.send_target())
            .with_translator(self.translator.clone())
    }

    /// Release this endpoint's client handle.
    ///
    /// Unsettled messages are left alone; their locks expire on the broker.
    pub fn stop(self) {
        tracing::info!(
            endpoint = %self.config,
            in_flight = self.in_flight.count(),
            "Stopping endpoint"
        );
    }
}

impl std::fmt::Debug for StartedEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartedEndpoint")
            .field("config", &self.config)
            .field("report", &self.report)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}
