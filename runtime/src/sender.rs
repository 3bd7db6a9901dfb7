//! Outbound sends.

use crate::metrics::SendMetrics;
use futures::TryStreamExt;
use leasebus_core::broker::BrokerClient;
use leasebus_core::entity::SendTarget;
use leasebus_core::error::SendError;
use leasebus_core::exchange::{Exchange, Payload};
use leasebus_core::translator::AttributeTranslator;
use std::sync::Arc;
use std::time::Instant;

/// Translates exchanges into wire messages and sends them to one entity.
pub struct OutboundSender {
    client: Arc<dyn BrokerClient>,
    target: SendTarget,
    translator: AttributeTranslator,
}

impl OutboundSender {
    /// Create a sender for `target`.
    #[must_use]
    pub fn new(client: Arc<dyn BrokerClient>, target: SendTarget) -> Self {
        Self {
            client,
            target,
            translator: AttributeTranslator::default(),
        }
    }

    /// Use a specific translator.
    #[must_use]
    pub fn with_translator(mut self, translator: AttributeTranslator) -> Self {
        self.translator = translator;
        self
    }

    /// The target entity.
    #[must_use]
    pub const fn target(&self) -> &SendTarget {
        &self.target
    }

    /// Send one exchange, returning once the broker has accepted it.
    ///
    /// The exchange's explicit message id, when set, overrides the message id
    /// header.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Body`] if a streaming body fails to read, and
    /// [`SendError::Broker`] if the broker does not accept the message.
    pub async fn send(&self, exchange: Exchange) -> Result<(), SendError> {
        let start = Instant::now();

        let mut message = self.translator.to_wire_message(&exchange.metadata);
        message.body = match exchange.payload {
            Payload::Stream(stream) => stream.try_concat().await?,
            Payload::Text(text) => text.into_bytes(),
            Payload::Bytes(bytes) => bytes,
            Payload::Empty => Vec::new(),
        };
        if let Some(message_id) = exchange.message_id {
            message.properties.message_id = Some(message_id);
        }
        let message_id = message.properties.message_id.clone();

        match self.client.send(&self.target, message).await {
            Ok(()) => {
                tracing::debug!(
                    target_entity = %self.target.path(),
                    message_id = ?message_id,
                    "Sent message"
                );
                SendMetrics::record_send(start.elapsed());
                Ok(())
            }
            Err(source) => {
                tracing::error!(
                    target_entity = %self.target.path(),
                    message_id = ?message_id,
                    error = %source,
                    "Send failed"
                );
                SendMetrics::record_error();
                Err(SendError::Broker {
                    target: self.target.path().to_string(),
                    source,
                })
            }
        }
    }
}

impl std::fmt::Debug for OutboundSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundSender")
            .field("target", &self.target)
            .field("translator", &self.translator)
            .finish_non_exhaustive()
    }
}
