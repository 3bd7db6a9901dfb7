//! Bidirectional mapping between generic metadata and broker wire properties.
//!
//! The translator is pure: it holds only policy (content type handling and the
//! application property header filter) and never touches the broker.
//!
//! # Directions
//!
//! - **Outbound** ([`AttributeTranslator::to_wire_message`]): recognised headers
//!   with the expected value type are copied onto [`BrokerProperties`]. Unknown
//!   headers, and recognised headers holding a value of the wrong type, are
//!   dropped without error.
//! - **Inbound** ([`AttributeTranslator::to_metadata`]): every recognised wire
//!   field is always present in the resulting metadata, as
//!   [`HeaderValue::Null`] when the broker did not set it.

use crate::message::{BrokerProperties, WireMessage};
use crate::metadata::{HeaderValue, Metadata, headers};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Content type reported in both directions unless passthrough is enabled.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// How the content type field is translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentTypePolicy {
    /// Always [`DEFAULT_CONTENT_TYPE`], whatever the sender or broker reported
    #[default]
    Fixed,
    /// Copy the real content type
    Passthrough,
}

/// Decides which inbound application properties become individual headers.
pub trait HeaderFilter: Send + Sync {
    /// Whether the application property `name` is copied as a header.
    fn should_propagate(&self, name: &str) -> bool;
}

impl<F> HeaderFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn should_propagate(&self, name: &str) -> bool {
        self(name)
    }
}

/// Propagates everything except names in the reserved connector namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHeaderFilter;

impl HeaderFilter for DefaultHeaderFilter {
    fn should_propagate(&self, name: &str) -> bool {
        !name.starts_with(headers::RESERVED_PREFIX)
    }
}

/// Maps metadata to wire messages and back.
#[derive(Clone)]
pub struct AttributeTranslator {
    content_type: ContentTypePolicy,
    filter: Arc<dyn HeaderFilter>,
}

impl fmt::Debug for AttributeTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeTranslator")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl Default for AttributeTranslator {
    fn default() -> Self {
        Self::new(ContentTypePolicy::Fixed)
    }
}

impl AttributeTranslator {
    /// Create a translator with the default header filter.
    #[must_use]
    pub fn new(content_type: ContentTypePolicy) -> Self {
        Self {
            content_type,
            filter: Arc::new(DefaultHeaderFilter),
        }
    }

    /// Replace the application property header filter.
    #[must_use]
    pub fn with_header_filter(mut self, filter: Arc<dyn HeaderFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// The content type policy.
    #[must_use]
    pub const fn content_type_policy(&self) -> ContentTypePolicy {
        self.content_type
    }

    /// Build a wire message carrying the recognised headers of `metadata`.
    ///
    /// The body is left empty; the sender fills it in.
    #[must_use]
    pub fn to_wire_message(&self, metadata: &Metadata) -> WireMessage {
        let text = |name: &str| metadata.text(name).map(str::to_string);
        let instant = |name: &str| match metadata.get(name) {
            Some(HeaderValue::Timestamp(value)) => Some(*value),
            _ => None,
        };

        let properties = BrokerProperties {
            message_id: text(headers::MESSAGE_ID),
            correlation_id: text(headers::CORRELATION_ID),
            delivery_count: metadata
                .get(headers::DELIVERY_COUNT)
                .and_then(HeaderValue::as_integer)
                .and_then(|count| u32::try_from(count).ok()),
            label: text(headers::LABEL),
            locked_until: instant(headers::LOCKED_UNTIL),
            lock_location: text(headers::LOCK_LOCATION),
            lock_token: text(headers::LOCK_TOKEN),
            message_location: text(headers::MESSAGE_LOCATION),
            partition_key: text(headers::PARTITION_KEY),
            reply_to: text(headers::REPLY_TO),
            reply_to_session_id: text(headers::REPLY_TO_SESSION_ID),
            scheduled_enqueue_time: instant(headers::SCHEDULED_ENQUEUE_TIME),
            sequence_number: metadata
                .get(headers::SEQUENCE_NUMBER)
                .and_then(HeaderValue::as_integer),
            time_to_live: match metadata.get(headers::TIME_TO_LIVE) {
                Some(HeaderValue::Duration(ttl)) => Some(*ttl),
                _ => None,
            },
            session_id: text(headers::SESSION_ID),
            to: text(headers::TO),
            via_partition_key: text(headers::VIA_PARTITION_KEY),
            content_type: match self.content_type {
                ContentTypePolicy::Fixed => Some(DEFAULT_CONTENT_TYPE.to_string()),
                ContentTypePolicy::Passthrough => text(headers::CONTENT_TYPE),
            },
            enqueued_time: instant(headers::ENQUEUED_TIME),
            dead_letter_reason: text(headers::DEAD_LETTER_REASON),
            dead_letter_error_description: text(headers::DEAD_LETTER_ERROR_DESCRIPTION),
            dead_letter_source: text(headers::DEAD_LETTER_SOURCE),
        };

        let application_properties = match metadata.get(headers::APPLICATION_PROPERTIES) {
            Some(HeaderValue::Properties(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

        WireMessage {
            body: Vec::new(),
            properties,
            application_properties,
        }
    }

    /// Expose every recognised wire field, plus filtered application properties.
    #[must_use]
    pub fn to_metadata(&self, message: &WireMessage) -> Metadata {
        let mut metadata = Metadata::new();

        for (name, value) in &message.application_properties {
            if self.filter.should_propagate(name) {
                metadata.insert(name.clone(), HeaderValue::from_json(value));
            }
        }

        let p = &message.properties;
        let timestamp = |value: Option<DateTime<Utc>>| HeaderValue::from(value);
        let duration = |value: Option<Duration>| HeaderValue::from(value);

        metadata.insert(headers::MESSAGE_ID, p.message_id.clone());
        metadata.insert(headers::CORRELATION_ID, p.correlation_id.clone());
        metadata.insert(headers::DELIVERY_COUNT, p.delivery_count.map(i64::from));
        metadata.insert(headers::LABEL, p.label.clone());
        metadata.insert(headers::LOCKED_UNTIL, timestamp(p.locked_until));
        metadata.insert(headers::LOCK_LOCATION, p.lock_location.clone());
        metadata.insert(headers::LOCK_TOKEN, p.lock_token.clone());
        metadata.insert(headers::MESSAGE_LOCATION, p.message_location.clone());
        metadata.insert(headers::PARTITION_KEY, p.partition_key.clone());
        metadata.insert(headers::REPLY_TO, p.reply_to.clone());
        metadata.insert(headers::REPLY_TO_SESSION_ID, p.reply_to_session_id.clone());
        metadata.insert(headers::SCHEDULED_ENQUEUE_TIME, timestamp(p.scheduled_enqueue_time));
        metadata.insert(headers::SEQUENCE_NUMBER, p.sequence_number);
        metadata.insert(headers::TIME_TO_LIVE, duration(p.time_to_live));
        metadata.insert(headers::SESSION_ID, p.session_id.clone());
        metadata.insert(headers::TO, p.to.clone());
        metadata.insert(headers::VIA_PARTITION_KEY, p.via_partition_key.clone());
        metadata.insert(headers::ENQUEUED_TIME, timestamp(p.enqueued_time));
        metadata.insert(headers::DEAD_LETTER_REASON, p.dead_letter_reason.clone());
        metadata.insert(
            headers::DEAD_LETTER_ERROR_DESCRIPTION,
            p.dead_letter_error_description.clone(),
        );
        metadata.insert(headers::DEAD_LETTER_SOURCE, p.dead_letter_source.clone());
        let mut bundle = p.to_map();
        match self.content_type {
            ContentTypePolicy::Fixed => {
                bundle.insert("ContentType".to_string(), Value::from(DEFAULT_CONTENT_TYPE));
                metadata.insert(headers::CONTENT_TYPE, DEFAULT_CONTENT_TYPE);
            }
            ContentTypePolicy::Passthrough => {
                metadata.insert(headers::CONTENT_TYPE, p.content_type.clone());
            }
        }
        metadata.insert(headers::BROKER_PROPERTIES, HeaderValue::Properties(bundle));
        metadata.insert(
            headers::APPLICATION_PROPERTIES,
            HeaderValue::Properties(message.application_properties.clone()),
        );

        metadata
    }
}
