//! Poll-driven lease consumer.
//!
//! Each [`LeaseConsumer::poll`] receives at most one message. A received
//! message is turned into an [`Exchange`], processed on a spawned task, and
//! settled by the [`CompletionHandler`] when processing finishes. `poll` never
//! waits for processing; it only waits for the receive call.
//!
//! ```text
//!            poll() → 1
//!   ┌──────┐ ───────────► ┌────────────────────┐
//!   │ Idle │              │ AwaitingCompletion │
//!   └──────┘ ◄─────────── └────────────────────┘
//!            commit / rollback
//! ```

use crate::completion::{CompletionHandler, PendingCompletion};
use crate::inflight::InFlight;
use crate::metrics::LeaseMetrics;
use futures::FutureExt;
use leasebus_core::broker::{BrokerClient, ReceiveOptions};
use leasebus_core::entity::ReceiveSource;
use leasebus_core::error::{ProcessingError, ReceiveError};
use leasebus_core::exchange::{CompletionOutcome, Exchange, Payload, Processor};
use leasebus_core::message::{LeaseEnvelope, WireMessage};
use leasebus_core::translator::AttributeTranslator;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use uuid::Uuid;

/// Whether a consumer has unsettled messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Nothing awaiting settlement
    Idle,
    /// At least one received message is still being processed
    AwaitingCompletion,
}

/// Receives from one queue or subscription and hands messages downstream.
pub struct LeaseConsumer {
    client: Arc<dyn BrokerClient>,
    source: ReceiveSource,
    options: ReceiveOptions,
    translator: AttributeTranslator,
    processor: Arc<dyn Processor>,
    completion: Arc<CompletionHandler>,
    in_flight: InFlight,
}

impl LeaseConsumer {
    /// Create a consumer.
    #[must_use]
    pub fn new(
        client: Arc<dyn BrokerClient>,
        source: ReceiveSource,
        options: ReceiveOptions,
        processor: Arc<dyn Processor>,
        completion: Arc<CompletionHandler>,
    ) -> Self {
        Self {
            client,
            source,
            options,
            translator: AttributeTranslator::default(),
            processor,
            completion,
            in_flight: InFlight::new(),
        }
    }

    /// Use a specific translator.
    #[must_use]
    pub fn with_translator(mut self, translator: AttributeTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// Share an in-flight tracker, e.g. across all consumers of an endpoint.
    #[must_use]
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// The source this consumer receives from.
    #[must_use]
    pub const fn source(&self) -> &ReceiveSource {
        &self.source
    }

    /// The in-flight tracker.
    #[must_use]
    pub const fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        if self.in_flight.count() > 0 {
            ConsumerState::AwaitingCompletion
        } else {
            ConsumerState::Idle
        }
    }

    /// Receive at most one message and start processing it.
    ///
    /// Returns the number of messages obtained, 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiveError::Broker`] if the receive call fails, and
    /// [`ReceiveError::MissingLockToken`] if a peek-lock receive returned a
    /// message that cannot be settled.
    pub async fn poll(&self) -> Result<usize, ReceiveError> {
        let path = self.source.path();

        let received = self
            .client
            .receive(&self.source, self.options)
            .await
            .map_err(|source| {
                LeaseMetrics::record_receive_error();
                ReceiveError::Broker {
                    path: path.clone(),
                    source,
                }
            })?;

        let Some(message) = received else {
            tracing::trace!(entity = %path, "No message available");
            LeaseMetrics::record_empty_poll();
            return Ok(0);
        };

        let Some(message_id) = message.message_id().map(str::to_string) else {
            tracing::debug!(entity = %path, "Ignoring received message without a message id");
            LeaseMetrics::record_empty_poll();
            return Ok(0);
        };

        let envelope = LeaseEnvelope {
            message,
            mode: self.options.mode,
            source_path: path.clone(),
        };
        if self.options.mode.is_peek_lock() && envelope.lock().is_none() {
            LeaseMetrics::record_receive_error();
            return Err(ReceiveError::MissingLockToken { message_id });
        }

        let pending = PendingCompletion::from_envelope(&envelope);
        let exchange = self.create_exchange(envelope.message);

        tracing::debug!(
            entity = %path,
            message_id = %message_id,
            exchange_id = %exchange.id,
            mode = %self.options.mode,
            "Received message"
        );
        LeaseMetrics::record_received(&path);

        let guard = self.in_flight.enter();
        let processor = Arc::clone(&self.processor);
        let completion = Arc::clone(&self.completion);
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = match AssertUnwindSafe(processor.process(exchange))
                .catch_unwind()
                .await
            {
                Ok(result) => CompletionOutcome::from(result),
                Err(panic) => CompletionOutcome::RolledBack(
                    ProcessingError::new(panic_message(panic.as_ref())).with_kind("panic"),
                ),
            };
            completion.complete(pending, outcome).await;
        });

        Ok(1)
    }

    fn create_exchange(&self, message: WireMessage) -> Exchange {
        let metadata = self.translator.to_metadata(&message);
        Exchange {
            id: Uuid::new_v4(),
            message_id: message.message_id().map(str::to_string),
            payload: Payload::Bytes(message.body),
            metadata,
        }
    }
}

impl std::fmt::Debug for LeaseConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseConsumer")
            .field("source", &self.source)
            .field("options", &self.options)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "processor panicked".to_string())
}
