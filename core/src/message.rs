//! Wire-level message shapes exchanged with the broker client.

use crate::broker::ReceiveMode;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::time::Duration;

/// Broker-specific system properties of a wire message.
///
/// Every field is optional: the broker fills in what it knows on receive, and
/// producers set what they want on send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerProperties {
    /// Message identifier
    pub message_id: Option<String>,
    /// Correlation identifier
    pub correlation_id: Option<String>,
    /// Number of deliveries so far
    pub delivery_count: Option<u32>,
    /// Application label (subject)
    pub label: Option<String>,
    /// Instant at which the current lock expires
    pub locked_until: Option<DateTime<Utc>>,
    /// Lock location URI
    pub lock_location: Option<String>,
    /// Lock token
    pub lock_token: Option<String>,
    /// Message location URI
    pub message_location: Option<String>,
    /// Partition key
    pub partition_key: Option<String>,
    /// Reply-to address
    pub reply_to: Option<String>,
    /// Reply-to session id
    pub reply_to_session_id: Option<String>,
    /// Instant at which the message becomes visible
    pub scheduled_enqueue_time: Option<DateTime<Utc>>,
    /// Broker-assigned sequence number
    pub sequence_number: Option<i64>,
    /// Time to live
    pub time_to_live: Option<Duration>,
    /// Session id
    pub session_id: Option<String>,
    /// "To" address
    pub to: Option<String>,
    /// Via-partition key for transactional sends
    pub via_partition_key: Option<String>,
    /// Content type reported by the sender
    pub content_type: Option<String>,
    /// Instant at which the broker accepted the message
    pub enqueued_time: Option<DateTime<Utc>>,
    /// Reason given when the message was dead-lettered
    pub dead_letter_reason: Option<String>,
    /// Description given when the message was dead-lettered
    pub dead_letter_error_description: Option<String>,
    /// Entity the message was dead-lettered from
    pub dead_letter_source: Option<String>,
}

impl BrokerProperties {
    /// Render the set properties as a JSON object, the "broker properties" bundle.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut text = |key: &str, value: &Option<String>| {
            if let Some(value) = value {
                map.insert(key.to_string(), Value::String(value.clone()));
            }
        };
        text("MessageId", &self.message_id);
        text("CorrelationId", &self.correlation_id);
        text("Label", &self.label);
        text("LockLocation", &self.lock_location);
        text("LockToken", &self.lock_token);
        text("MessageLocation", &self.message_location);
        text("PartitionKey", &self.partition_key);
        text("ReplyTo", &self.reply_to);
        text("ReplyToSessionId", &self.reply_to_session_id);
        text("SessionId", &self.session_id);
        text("To", &self.to);
        text("ViaPartitionKey", &self.via_partition_key);
        text("ContentType", &self.content_type);
        text("DeadLetterReason", &self.dead_letter_reason);
        text("DeadLetterErrorDescription", &self.dead_letter_error_description);
        text("DeadLetterSource", &self.dead_letter_source);

        let instants = [
            ("LockedUntil", self.locked_until),
            ("ScheduledEnqueueTime", self.scheduled_enqueue_time),
            ("EnqueuedTime", self.enqueued_time),
        ];
        for (key, instant) in instants {
            if let Some(instant) = instant {
                map.insert(key.to_string(), Value::String(instant.to_rfc3339()));
            }
        }
        if let Some(count) = self.delivery_count {
            map.insert("DeliveryCount".to_string(), Value::from(count));
        }
        if let Some(sequence) = self.sequence_number {
            map.insert("SequenceNumber".to_string(), Value::from(sequence));
        }
        if let Some(ttl) = self.time_to_live {
            map.insert("TimeToLive".to_string(), Value::from(ttl.as_secs_f64()));
        }
        map
    }
}

/// A message as the broker client sees it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireMessage {
    /// Opaque body
    pub body: Vec<u8>,
    /// System properties
    pub properties: BrokerProperties,
    /// User-defined application properties
    pub application_properties: Map<String, Value>,
}

impl WireMessage {
    /// Create a wire message with the given body and no properties.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Set the message id.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.properties.message_id = Some(message_id.into());
        self
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.properties.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add an application property.
    #[must_use]
    pub fn with_application_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.application_properties.insert(name.into(), value.into());
        self
    }

    /// The message id, treating an empty string as absent.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.properties
            .message_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// The lease on this message, if it was received in peek-lock mode.
    #[must_use]
    pub fn lease_lock(&self) -> Option<LeaseLock> {
        self.properties.lock_token.as_ref().map(|token| LeaseLock {
            token: token.clone(),
            location: self.properties.lock_location.clone(),
        })
    }
}

/// The identifiers needed to settle a leased message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseLock {
    /// Lock token
    pub token: String,
    /// Lock location URI
    pub location: Option<String>,
}

/// One received message together with how it was received.
///
/// Consumed exactly once: the consumer splits it into the downstream exchange
/// and a completion ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseEnvelope {
    /// The received message
    pub message: WireMessage,
    /// Mode the message was received in
    pub mode: ReceiveMode,
    /// Path of the entity it was received from
    pub source_path: String,
}

impl LeaseEnvelope {
    /// The lease, present for peek-lock receives that carry a lock token.
    #[must_use]
    pub fn lock(&self) -> Option<LeaseLock> {
        match self.mode {
            ReceiveMode::PeekLock => self.message.lease_lock(),
            ReceiveMode::ReceiveAndDelete => None,
        }
    }
}
